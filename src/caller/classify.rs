use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::TypingConfig;
use crate::genomics::DiagnosticSite;
use crate::panel::SitePattern;

/// Zygosity class of one diagnostic site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SiteClass {
    /// Evidence depth below the site minimum.
    Uncalled,
    /// Variant fraction below the present cutoff.
    HomozygousReference,
    /// Variant present but below the dominant cutoff.
    HeterozygousLight,
    /// Variant dominant, reference still present.
    Heterozygous,
    /// Variant dominant, reference below the present cutoff.
    HomozygousVariant,
}

impl SiteClass {
    /// Label used in call files and logs.
    pub fn label(self) -> &'static str {
        match self {
            SiteClass::Uncalled => "uncalled",
            SiteClass::HomozygousReference => "homozygous-reference",
            SiteClass::HeterozygousLight => "heterozygous-light",
            SiteClass::Heterozygous => "heterozygous",
            SiteClass::HomozygousVariant => "homozygous-variant",
        }
    }
}

impl fmt::Display for SiteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SiteClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uncalled" => Ok(SiteClass::Uncalled),
            "homozygous-reference" => Ok(SiteClass::HomozygousReference),
            "heterozygous-light" => Ok(SiteClass::HeterozygousLight),
            "heterozygous" => Ok(SiteClass::Heterozygous),
            "homozygous-variant" => Ok(SiteClass::HomozygousVariant),
            other => Err(format!("unknown site class '{other}'")),
        }
    }
}

impl SitePattern {
    /// Whether a site of class `class` satisfies this pattern.
    pub fn matches(self, class: SiteClass) -> bool {
        match self {
            SitePattern::Any => true,
            SitePattern::Ref => class == SiteClass::HomozygousReference,
            SitePattern::Het => {
                matches!(class, SiteClass::HeterozygousLight | SiteClass::Heterozygous)
            }
            SitePattern::HetLight => class == SiteClass::HeterozygousLight,
            SitePattern::HetDominant => class == SiteClass::Heterozygous,
            SitePattern::Alt => class == SiteClass::HomozygousVariant,
            SitePattern::Uncalled => class == SiteClass::Uncalled,
        }
    }
}

/// Classification of one site together with the evidence behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteCall {
    /// Panel site name.
    pub site_name: String,
    /// Position (1-based).
    pub position: u32,
    /// Assigned class.
    pub class: SiteClass,
    /// Variant allele fraction.
    pub variant_fraction: f64,
    /// Reference allele fraction.
    pub reference_fraction: f64,
    /// Evidence depth the class was derived from.
    pub depth: u32,
    /// The comparison that decided the class.
    pub reason: String,
}

/// Classify one site against the present/dominant cutoffs.
pub fn classify_site(site: &DiagnosticSite, config: &TypingConfig) -> SiteCall {
    let depth = site.evidence_depth();
    let vaf = site.variant_fraction();
    let rf = site.reference_fraction();
    let present = config.present_cutoff;
    let dominant = config.dominant_cutoff;

    let (class, reason) = if depth < config.min_site_depth {
        (
            SiteClass::Uncalled,
            format!("depth {depth} < min_site_depth {}", config.min_site_depth),
        )
    } else if vaf < present {
        (SiteClass::HomozygousReference, format!("vaf {vaf:.4} < present {present:.2}"))
    } else if vaf < dominant {
        (
            SiteClass::HeterozygousLight,
            format!("present {present:.2} <= vaf {vaf:.4} < dominant {dominant:.2}"),
        )
    } else if rf >= present {
        (
            SiteClass::Heterozygous,
            format!("vaf {vaf:.4} >= dominant {dominant:.2}, rf {rf:.4} >= present {present:.2}"),
        )
    } else {
        (
            SiteClass::HomozygousVariant,
            format!("vaf {vaf:.4} >= dominant {dominant:.2}, rf {rf:.4} < present {present:.2}"),
        )
    };

    SiteCall {
        site_name: site.site_name.clone(),
        position: site.position,
        class,
        variant_fraction: vaf,
        reference_fraction: rf,
        depth,
        reason,
    }
}
