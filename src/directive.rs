//! Directive construction from request fields
//!
//! Requests may carry a legacy free-text prompt, structured fields (a material
//! preset, a style prompt, expert notes), or both. [`build_directive`] is the
//! single place that decides what the edit stage is told.

use crate::error::{Result, SmileDesignError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Restoration styles offered to clinicians
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialPreset {
    Whitening,
    Hollywood,
    Veneer,
    Emax,
    Zirconium,
    Allon4,
}

impl MaterialPreset {
    pub const ALL: [Self; 6] = [
        Self::Whitening,
        Self::Hollywood,
        Self::Veneer,
        Self::Emax,
        Self::Zirconium,
        Self::Allon4,
    ];

    /// Stable identifier used on the wire
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Whitening => "whitening",
            Self::Hollywood => "hollywood",
            Self::Veneer => "veneer",
            Self::Emax => "emax",
            Self::Zirconium => "zirconium",
            Self::Allon4 => "allon4",
        }
    }

    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Whitening => "Natural Whitening",
            Self::Hollywood => "Hollywood Smile",
            Self::Veneer => "Porcelain Veneer",
            Self::Emax => "E-Max (Lithium Disilicate)",
            Self::Zirconium => "Zirconium",
            Self::Allon4 => "Implant-Supported Zirconium (All-on-4)",
        }
    }

    /// Style text sent to the edit stage for this preset
    #[must_use]
    pub fn prompt(self) -> &'static str {
        match self {
            Self::Whitening => {
                "Natural teeth texture, brighter shade, translucent edges, retain original shape."
            },
            Self::Hollywood => {
                "Perfectly aligned teeth, bright white, symmetrical, flawless, celebrity smile style."
            },
            Self::Veneer => {
                "Porcelain veneer texture, high translucency, perfectly smooth surface, anatomical contouring."
            },
            Self::Emax => {
                "Glass-ceramic texture, highly aesthetic, natural light transmission, warm white tone."
            },
            Self::Zirconium => {
                "Opaque white, high durability look, monolithic zirconia texture, hollywood smile style."
            },
            Self::Allon4 => {
                "Fixed prosthesis, pink gum architecture integration, perfectly aligned artificial gum line, white zirconium teeth."
            },
        }
    }
}

impl FromStr for MaterialPreset {
    type Err = SmileDesignError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|preset| preset.id() == normalized)
            .ok_or_else(|| {
                SmileDesignError::invalid_input(format!(
                    "Unknown material preset '{}'. Valid presets: {}",
                    s,
                    Self::ALL.map(Self::id).join(", ")
                ))
            })
    }
}

impl std::fmt::Display for MaterialPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Raw directive fields as they arrive from a request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectiveFields {
    /// Legacy free-text prompt
    pub prompt: Option<String>,
    /// Explicit style text; overrides the material preset's prompt
    pub style_prompt: Option<String>,
    /// Free-form clinician notes appended to the style
    pub expert_prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub material: Option<MaterialPreset>,
}

/// What the edit stage is asked to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub prompt: String,
    /// `None` means the configured default negative directive applies
    pub negative_prompt: Option<String>,
}

impl Directive {
    /// Directive from plain text
    ///
    /// # Errors
    /// - [`SmileDesignError::InvalidInput`] when `prompt` is blank
    pub fn new<S: Into<String>>(prompt: S) -> Result<Self> {
        build_directive(&DirectiveFields {
            prompt: Some(prompt.into()),
            ..DirectiveFields::default()
        })
    }

    #[must_use]
    pub fn with_negative<S: Into<String>>(mut self, negative: S) -> Self {
        self.negative_prompt = non_blank(Some(negative.into()).as_deref());
        self
    }

    /// Negative directive, or `default` when none was given
    #[must_use]
    pub fn negative_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.negative_prompt.as_deref().unwrap_or(default)
    }
}

/// Collapse request fields into one directive
///
/// Precedence:
/// 1. Structured fields: style text (explicit `style_prompt`, else the
///    material preset's prompt) followed by `expert_prompt`
/// 2. Legacy `prompt`, only when no structured field is present
///
/// # Errors
/// - [`SmileDesignError::InvalidInput`] when every field is blank
pub fn build_directive(fields: &DirectiveFields) -> Result<Directive> {
    let style = non_blank(fields.style_prompt.as_deref())
        .or_else(|| fields.material.map(|preset| preset.prompt().to_string()));
    let expert = non_blank(fields.expert_prompt.as_deref());

    let structured: Vec<String> = style.into_iter().chain(expert).collect();
    let prompt = if structured.is_empty() {
        non_blank(fields.prompt.as_deref())
    } else {
        Some(structured.join(" "))
    };

    let prompt = prompt.ok_or_else(|| {
        SmileDesignError::invalid_input("Directive is empty: provide a prompt, style or material")
    })?;

    Ok(Directive {
        prompt,
        negative_prompt: non_blank(fields.negative_prompt.as_deref()),
    })
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_prompt_only() {
        let directive = build_directive(&DirectiveFields {
            prompt: Some("  whiter teeth ".to_string()),
            ..DirectiveFields::default()
        })
        .unwrap();
        assert_eq!(directive.prompt, "whiter teeth");
        assert!(directive.negative_prompt.is_none());
    }

    #[test]
    fn test_structured_fields_override_legacy() {
        let directive = build_directive(&DirectiveFields {
            prompt: Some("legacy text".to_string()),
            material: Some(MaterialPreset::Veneer),
            expert_prompt: Some("close the diastema".to_string()),
            ..DirectiveFields::default()
        })
        .unwrap();
        assert!(directive.prompt.starts_with(MaterialPreset::Veneer.prompt()));
        assert!(directive.prompt.ends_with("close the diastema"));
        assert!(!directive.prompt.contains("legacy"));
    }

    #[test]
    fn test_style_prompt_overrides_material() {
        let directive = build_directive(&DirectiveFields {
            style_prompt: Some("matte finish".to_string()),
            material: Some(MaterialPreset::Hollywood),
            ..DirectiveFields::default()
        })
        .unwrap();
        assert_eq!(directive.prompt, "matte finish");
    }

    #[test]
    fn test_blank_fields_fall_back_to_legacy() {
        let directive = build_directive(&DirectiveFields {
            prompt: Some("legacy".to_string()),
            style_prompt: Some("   ".to_string()),
            expert_prompt: Some(String::new()),
            ..DirectiveFields::default()
        })
        .unwrap();
        assert_eq!(directive.prompt, "legacy");
    }

    #[test]
    fn test_empty_directive_is_rejected() {
        let result = build_directive(&DirectiveFields::default());
        assert!(matches!(result, Err(SmileDesignError::InvalidInput(_))));
        assert!(Directive::new(" ").is_err());
    }

    #[test]
    fn test_negative_prompt_default() {
        let directive = Directive::new("brighter").unwrap();
        assert_eq!(directive.negative_or("blur"), "blur");
        let directive = directive.with_negative("metal");
        assert_eq!(directive.negative_or("blur"), "metal");
    }

    #[test]
    fn test_preset_parsing() {
        assert_eq!("emax".parse::<MaterialPreset>().unwrap(), MaterialPreset::Emax);
        assert_eq!("E-Max".parse::<MaterialPreset>().unwrap(), MaterialPreset::Emax);
        assert_eq!("All-on-4".parse::<MaterialPreset>().unwrap(), MaterialPreset::Allon4);
        assert!("gold".parse::<MaterialPreset>().is_err());

        let json = serde_json::to_string(&MaterialPreset::Allon4).unwrap();
        assert_eq!(json, "\"allon4\"");
    }
}
