//! Feature parameter tables
//!
//! See the [`size`](https://learn.microsoft.com/en-us/typography/opentype/spec/features_pt#tag-size),
//! [`ssXX`](https://learn.microsoft.com/en-us/typography/opentype/spec/features_pt#ss01--ss20)
//! and [`cvXX`](https://learn.microsoft.com/en-us/typography/opentype/spec/features_ae#cv01-cv99)
//! feature descriptions.

use otl_types::{NameId, Tag, GPOS, GSUB};

use crate::write::{FontWrite, TableWriter};

/// Parameters attached to a feature table.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FeatureParams {
    /// Parameters of the GPOS `size` feature.
    Size {
        /// In decipoints
        design_size: u16,
        subfamily_id: u16,
        subfamily_name_id: Option<NameId>,
        /// In decipoints, exclusive
        range_start: u16,
        /// In decipoints, inclusive
        range_end: u16,
    },
    /// Parameters of a stylistic set (`ss01`..`ss20`) feature.
    StylisticSet { ui_name_id: NameId },
    /// Parameters of a character variant (`cv01`..`cv99`) feature.
    CharacterVariant {
        label_name_id: Option<NameId>,
        tooltip_name_id: Option<NameId>,
        sample_text_name_id: Option<NameId>,
        num_named_parameters: u16,
        first_param_ui_label_name_id: Option<NameId>,
        characters: Vec<char>,
    },
}

fn name_or_null(id: &Option<NameId>) -> NameId {
    id.unwrap_or_default()
}

impl FeatureParams {
    /// The table these parameters belong in.
    pub fn table(&self) -> Tag {
        match self {
            FeatureParams::Size { .. } => GPOS,
            _ => GSUB,
        }
    }

    /// Whether these parameters may be attached to a feature with `tag`.
    pub fn allowed_for(&self, tag: Tag) -> bool {
        match self {
            FeatureParams::Size { .. } => tag == Tag::new(b"size"),
            FeatureParams::StylisticSet { .. } => tag.is_stylistic_set(),
            FeatureParams::CharacterVariant { .. } => tag.is_character_variant(),
        }
    }

    /// Size in bytes, padded to an even length.
    pub fn size(&self) -> usize {
        match self {
            FeatureParams::Size { .. } => 10,
            FeatureParams::StylisticSet { .. } => 4,
            FeatureParams::CharacterVariant { characters, .. } => {
                let len = 14 + 3 * characters.len();
                len + len % 2
            }
        }
    }
}

impl FontWrite for FeatureParams {
    fn write_into(&self, writer: &mut TableWriter) {
        match self {
            FeatureParams::Size {
                design_size,
                subfamily_id,
                subfamily_name_id,
                range_start,
                range_end,
            } => {
                writer.write(design_size);
                writer.write(subfamily_id);
                writer.write(&name_or_null(subfamily_name_id));
                writer.write(range_start);
                writer.write(range_end);
            }
            FeatureParams::StylisticSet { ui_name_id } => {
                // version
                writer.write(&0u16);
                writer.write(ui_name_id);
            }
            FeatureParams::CharacterVariant {
                label_name_id,
                tooltip_name_id,
                sample_text_name_id,
                num_named_parameters,
                first_param_ui_label_name_id,
                characters,
            } => {
                // format
                writer.write(&0u16);
                writer.write(&name_or_null(label_name_id));
                writer.write(&name_or_null(tooltip_name_id));
                writer.write(&name_or_null(sample_text_name_id));
                writer.write(num_named_parameters);
                writer.write(&name_or_null(first_param_ui_label_name_id));
                writer.write(&(characters.len() as u16));
                for c in characters {
                    // chars are at most 0x10FFFF, so they fit in a uint24
                    writer.write_slice(&u32::from(*c).to_be_bytes()[1..]);
                }
                if characters.len() % 2 == 1 {
                    writer.write(&0u8);
                }
            }
        }
    }
}
