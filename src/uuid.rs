//! Conversions between the 16-bit SIG short form ("180D") and full 128-bit UUIDs.

use uuid::Uuid;

use crate::{Error, Result};

// 0000xxxx-0000-1000-8000-00805F9B34FB
const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;
const SHORT_MASK: u128 = 0xffff_0000 << 96;

pub trait ShortUuid {
    fn from_short(short: u16) -> Self;

    /// Parses either the 4 or 8 hex digit short form or a full hyphenated UUID.
    fn from_short_str(s: &str) -> Result<Self>
    where
        Self: Sized;

    /// The 16-bit form if this UUID sits on the Bluetooth base, otherwise the full form.
    fn to_short_string(&self) -> String;
}

impl ShortUuid for Uuid {
    fn from_short(short: u16) -> Self {
        Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
    }

    fn from_short_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.len() {
            4 => u16::from_str_radix(s, 16)
                .map(Uuid::from_short)
                .map_err(|_| Error::InvalidUuid(s.to_string())),
            8 => u32::from_str_radix(s, 16)
                .map(|short| Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96)))
                .map_err(|_| Error::InvalidUuid(s.to_string())),
            _ => Uuid::parse_str(s).map_err(|_| Error::InvalidUuid(s.to_string())),
        }
    }

    fn to_short_string(&self) -> String {
        let value = self.as_u128();
        if value & !SHORT_MASK == BLUETOOTH_BASE_UUID && value >> 112 == 0 {
            format!("{:04X}", (value >> 96) as u16)
        } else {
            self.hyphenated().to_string().to_uppercase()
        }
    }
}

pub(crate) mod wire {
    //! Serde adapters so UUIDs travel in their short form.

    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};
    use uuid::Uuid;

    use super::ShortUuid;

    pub fn serialize<S: Serializer>(uuid: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&uuid.to_short_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uuid, D::Error> {
        let s = String::deserialize(deserializer)?;
        Uuid::from_short_str(&s).map_err(D::Error::custom)
    }

    pub mod list {
        use serde::{Deserialize, Deserializer, Serializer, de::Error as _, ser::SerializeSeq};
        use uuid::Uuid;

        use crate::uuid::ShortUuid;

        pub fn serialize<S: Serializer>(
            uuids: &Option<Vec<Uuid>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match uuids {
                None => serializer.serialize_none(),
                Some(uuids) => {
                    let mut seq = serializer.serialize_seq(Some(uuids.len()))?;
                    for uuid in uuids {
                        seq.serialize_element(&uuid.to_short_string())?;
                    }
                    seq.end()
                }
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<Uuid>>, D::Error> {
            let raw: Option<Vec<String>> = Option::deserialize(deserializer)?;
            raw.map(|list| {
                list.iter()
                    .map(|s| Uuid::from_short_str(s).map_err(D::Error::custom))
                    .collect()
            })
            .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_round_trips_through_base_uuid() {
        let heart_rate = Uuid::from_short(0x180d);
        assert_eq!(
            heart_rate.hyphenated().to_string(),
            "0000180d-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(heart_rate.to_short_string(), "180D");
        assert_eq!(Uuid::from_short_str("180d").unwrap(), heart_rate);
    }

    #[test]
    fn vendor_uuid_keeps_full_form() {
        let vendor = Uuid::parse_str("6e400001-b5a3-f393-e0a9-e50e24dcca9e").unwrap();
        assert_eq!(
            vendor.to_short_string(),
            "6E400001-B5A3-F393-E0A9-E50E24DCCA9E"
        );
        assert_eq!(Uuid::from_short_str(&vendor.to_short_string()).unwrap(), vendor);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            Uuid::from_short_str("zz0D"),
            Err(Error::InvalidUuid(_))
        ));
    }
}
