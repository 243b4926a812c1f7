//! Hierarchical contact record model
//!
//! A [`Record`] is one address book entry: nullable scalar fields followed by
//! four ordered sub-collections. Field order here is the serialization order
//! of the backup file, and every field is always written (`null` for absent
//! scalars, `[]` for empty collections). Decoding is lenient: see
//! [`crate::lenient`].

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::codec::{decode_blob, encode_blob};
use crate::constants as col;
use crate::error::{CbakError, Result};
use crate::lenient;
use crate::limits::Limits;

/// One contact entry, the unit of export and import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Identifier assigned by the source store. Carried as an opaque label;
    /// the destination store assigns its own identifier on import.
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub id: Option<i64>,
    /// Structured name.
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    /// Custom ring tone URI.
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub custom_ring_tone: Option<String>,
    /// Name shown in lists.
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub display_name: Option<String>,
    /// Last time contacted, epoch millis.
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub last_time_contacted: Option<i64>,
    /// Free-form notes.
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub notes: Option<String>,
    /// Phonetic spelling of the name.
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub phonetic_name: Option<String>,
    /// Route calls straight to voicemail.
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub send_to_voicemail: Option<bool>,
    /// Starred / favourite flag.
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub starred: Option<bool>,
    /// Number of times contacted.
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub times_contacted: Option<u32>,
    /// Email addresses, postal addresses, IM handles.
    #[serde(default, deserialize_with = "lenient::list")]
    pub contact_methods: Vec<ContactMethod>,
    /// Phone numbers.
    #[serde(default, deserialize_with = "lenient::list")]
    pub phone_numbers: Vec<PhoneNumber>,
    /// Organizations the contact belongs to.
    #[serde(default, deserialize_with = "lenient::list")]
    pub organizations: Vec<Organization>,
    /// Photo blobs, base64 encoded in transit.
    #[serde(default, deserialize_with = "lenient::list")]
    pub photos: Vec<Photo>,
}

/// Non-phone contact method (email, postal address, IM).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactMethod {
    /// Primary entry of its kind.
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_primary: bool,
    /// Custom label.
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub label: Option<String>,
    /// Type code.
    #[serde(rename = "type", default, deserialize_with = "lenient::opt_string")]
    pub kind_type: Option<String>,
    /// Auxiliary data (IM protocol, ...).
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub aux_data: Option<String>,
    /// The address or handle itself.
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub data: Option<String>,
    /// Method kind (email, postal, im).
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub kind: Option<String>,
}

/// Phone number entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneNumber {
    /// Primary number.
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_primary: bool,
    /// Custom label.
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub label: Option<String>,
    /// The number as entered.
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub number: Option<String>,
    /// Normalized lookup key.
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub number_key: Option<String>,
    /// Type code (home, mobile, work, ...).
    #[serde(rename = "type", default, deserialize_with = "lenient::opt_string")]
    pub phone_type: Option<String>,
}

/// Organization membership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// Primary organization.
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_primary: bool,
    /// Custom label.
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub label: Option<String>,
    /// Job title.
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub title: Option<String>,
    /// Company name.
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub company: Option<String>,
    /// Type code.
    #[serde(rename = "type", default, deserialize_with = "lenient::opt_string")]
    pub org_type: Option<String>,
}

/// Opaque photo bytes; serialized as base64 text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Photo(pub Vec<u8>);

impl Photo {
    /// Raw image bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Photo {
    fn from(bytes: Vec<u8>) -> Self {
        Photo(bytes)
    }
}

impl Serialize for Photo {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode_blob(&self.0))
    }
}

impl<'de> Deserialize<'de> for Photo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        decode_blob(&text).map(Photo).map_err(de::Error::custom)
    }
}

impl Record {
    /// Create a record with only a name set.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Human-readable label used in progress notifications.
    pub fn label(&self) -> String {
        let non_empty = |s: &Option<String>| {
            s.as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(str::to_owned)
        };
        non_empty(&self.display_name)
            .or_else(|| non_empty(&self.name))
            .or_else(|| self.id.map(|id| format!("#{id}")))
            .unwrap_or_else(|| "(unnamed)".to_string())
    }

    /// The first photo, if any; the only one restored on import.
    pub fn primary_photo(&self) -> Option<&Photo> {
        self.photos.first().filter(|p| !p.0.is_empty())
    }

    /// Check every text field and blob against `limits`.
    pub fn validate(&self, limits: &Limits) -> Result<()> {
        let check = |field: &'static str, value: &Option<String>| -> Result<()> {
            match value {
                Some(text) if text.len() > limits.max_field_len => Err(CbakError::FieldTooLong {
                    field,
                    len: text.len(),
                    max: limits.max_field_len,
                }),
                _ => Ok(()),
            }
        };

        check(col::NAME, &self.name)?;
        check(col::CUSTOM_RING_TONE, &self.custom_ring_tone)?;
        check(col::DISPLAY_NAME, &self.display_name)?;
        check(col::NOTES, &self.notes)?;
        check(col::PHONETIC_NAME, &self.phonetic_name)?;

        for method in &self.contact_methods {
            check(col::LABEL, &method.label)?;
            check(col::TYPE, &method.kind_type)?;
            check(col::AUX_DATA, &method.aux_data)?;
            check(col::DATA, &method.data)?;
            check(col::KIND, &method.kind)?;
        }
        for phone in &self.phone_numbers {
            check(col::LABEL, &phone.label)?;
            check(col::NUMBER, &phone.number)?;
            check(col::NUMBER_KEY, &phone.number_key)?;
            check(col::TYPE, &phone.phone_type)?;
        }
        for org in &self.organizations {
            check(col::LABEL, &org.label)?;
            check(col::TITLE, &org.title)?;
            check(col::COMPANY, &org.company)?;
            check(col::TYPE, &org.org_type)?;
        }
        for (idx, photo) in self.photos.iter().enumerate() {
            if photo.0.len() > limits.max_photo_bytes {
                return Err(CbakError::LimitExceeded(format!(
                    "photo #{idx} is {} bytes (max: {})",
                    photo.0.len(),
                    limits.max_photo_bytes
                )));
            }
        }

        Ok(())
    }
}
