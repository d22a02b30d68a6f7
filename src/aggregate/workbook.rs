use std::collections::HashSet;

use rust_xlsxwriter::{
    Color, DocProperties, ExcelDateTime, Format, Workbook, Worksheet, XlsxError,
};

use crate::aggregate::{AggregateError, AggregateReport, SampleResult};
use crate::genomics::Region;

const MAX_SHEET_NAME: usize = 31;
const SUMMARY_SHEET: &str = "Summary";

const SUMMARY_HEADER: [&str; 13] = [
    "Sample",
    "Barcode",
    "Exon6 status",
    "Exon6 genotype",
    "Exon6 phenotype",
    "Exon7 status",
    "Exon7 genotype",
    "Exon7 phenotype",
    "Phenotype",
    "Genotype",
    "Reliability",
    "Min reads",
    "Flags",
];

const SITE_HEADER: [&str; 7] = [
    "Region",
    "Site",
    "Position",
    "Class",
    "Variant fraction",
    "Reference fraction",
    "Reads",
];

/// Excel-safe sheet name, unique (case-insensitively) among `taken`.
fn sheet_name(sample_id: &str, taken: &mut HashSet<String>) -> String {
    let cleaned: String = sample_id
        .chars()
        .map(|c| {
            if matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\') {
                '_'
            } else {
                c
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('\'');
    let base: String = if cleaned.is_empty() {
        "sample".into()
    } else {
        cleaned.chars().take(MAX_SHEET_NAME).collect()
    };

    let mut candidate = base.clone();
    let mut suffix = 2;
    while !taken.insert(candidate.to_lowercase()) {
        let tag = format!("~{suffix}");
        let keep = MAX_SHEET_NAME - tag.chars().count();
        candidate = format!("{}{tag}", base.chars().take(keep).collect::<String>());
        suffix += 1;
    }
    candidate
}

struct Formats {
    header: Format,
    very_low: Format,
    low: Format,
}

impl Formats {
    fn new() -> Self {
        Self {
            header: Format::new().set_bold(),
            very_low: Format::new().set_background_color(Color::Red),
            low: Format::new().set_background_color(Color::Orange),
        }
    }

    /// Read-count highlight: 20 or fewer red, 21 to 40 orange.
    fn for_depth(&self, depth: u32) -> Option<&Format> {
        match depth {
            0..=20 => Some(&self.very_low),
            21..=40 => Some(&self.low),
            _ => None,
        }
    }
}

fn write_header(
    sheet: &mut Worksheet,
    header: &[&str],
    format: &Format,
) -> Result<(), XlsxError> {
    for (col, title) in header.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, format)?;
    }
    Ok(())
}

fn write_depth(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    depth: u32,
    formats: &Formats,
) -> Result<(), XlsxError> {
    match formats.for_depth(depth) {
        Some(format) => sheet.write_number_with_format(row, col, depth, format)?,
        None => sheet.write_number(row, col, depth)?,
    };
    Ok(())
}

fn write_summary_row(
    sheet: &mut Worksheet,
    row: u32,
    result: &SampleResult,
    formats: &Formats,
) -> Result<(), XlsxError> {
    sheet.write_string(row, 0, &result.sample_id)?;
    sheet.write_string(row, 1, result.barcode.as_deref().unwrap_or(""))?;
    let mut col = 2u16;
    for region in Region::ALL {
        let call = result.call(region);
        sheet.write_string(row, col, call.map_or("", |c| c.status().label()))?;
        sheet.write_string(row, col + 1, call.and_then(|c| c.genotype()).unwrap_or(""))?;
        sheet.write_string(row, col + 2, call.and_then(|c| c.phenotype()).unwrap_or(""))?;
        col += 3;
    }
    sheet.write_string(row, 8, result.composite.label())?;
    sheet.write_string(row, 9, result.genotype().unwrap_or(""))?;
    sheet.write_string(row, 10, result.reliability.label())?;
    if let Some(depth) = result.min_depth {
        write_depth(sheet, row, 11, depth, formats)?;
    }
    sheet.write_string(row, 12, result.flags.join(","))?;
    Ok(())
}

fn write_sample_sheet(
    sheet: &mut Worksheet,
    result: &SampleResult,
    formats: &Formats,
) -> Result<(), XlsxError> {
    write_header(sheet, &SITE_HEADER, &formats.header)?;
    let mut row = 1u32;
    for region in Region::ALL {
        let Some(call) = result.call(region) else {
            sheet.write_string(row, 0, region.label())?;
            sheet.write_string(row, 1, "no call")?;
            row += 1;
            continue;
        };
        for site in call.site_calls() {
            sheet.write_string(row, 0, region.label())?;
            sheet.write_string(row, 1, &site.site_name)?;
            sheet.write_number(row, 2, site.position)?;
            sheet.write_string(row, 3, site.class.label())?;
            sheet.write_number(row, 4, site.variant_fraction)?;
            sheet.write_number(row, 5, site.reference_fraction)?;
            write_depth(sheet, row, 6, site.depth, formats)?;
            row += 1;
        }
        if call.site_calls().is_empty() {
            sheet.write_string(row, 0, region.label())?;
            sheet.write_string(row, 1, call.status().label())?;
            row += 1;
        }
    }
    Ok(())
}

/// `ABO_result.xlsx`: a `Summary` sheet plus one detail sheet per sample.
/// The creation timestamp is fixed so re-runs produce the same document.
pub fn render_workbook(report: &AggregateReport) -> Result<Vec<u8>, AggregateError> {
    let formats = Formats::new();
    let mut workbook = Workbook::new();
    let created = ExcelDateTime::from_ymd(2000, 1, 1)?;
    let properties = DocProperties::new()
        .set_title("ABO typing results")
        .set_creation_datetime(&created);
    workbook.set_properties(&properties);

    let mut taken = HashSet::new();
    taken.insert(SUMMARY_SHEET.to_lowercase());
    {
        let summary = workbook.add_worksheet();
        summary.set_name(SUMMARY_SHEET)?;
        write_header(summary, &SUMMARY_HEADER, &formats.header)?;
        for (idx, result) in report.results().iter().enumerate() {
            write_summary_row(summary, idx as u32 + 1, result, &formats)?;
        }
    }

    for result in report.results() {
        let name = sheet_name(&result.sample_id, &mut taken);
        let sheet = workbook.add_worksheet();
        sheet.set_name(&name)?;
        write_sample_sheet(sheet, result, &formats)?;
    }

    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_names_are_sanitised_and_unique() {
        let mut taken = HashSet::new();
        taken.insert("summary".to_string());
        assert_eq!(sheet_name("IMM:24/1", &mut taken), "IMM_24_1");
        assert_eq!(sheet_name("Summary", &mut taken), "Summary~2");
        let long = "X".repeat(40);
        let first = sheet_name(&long, &mut taken);
        let second = sheet_name(&long, &mut taken);
        assert_eq!(first.chars().count(), 31);
        assert_eq!(second, format!("{}~2", "X".repeat(29)));
    }

    #[test]
    fn depth_highlight_bands() {
        let formats = Formats::new();
        assert!(formats.for_depth(20).is_some());
        assert!(formats.for_depth(40).is_some());
        assert!(formats.for_depth(41).is_none());
    }

    #[test]
    fn renders_a_zip_container() {
        let mut report = AggregateReport::default();
        report.push(SampleResult::new(None, "S01_barcode01", None, None)).unwrap();
        let bytes = render_workbook(&report).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }
}
