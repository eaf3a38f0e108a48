use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialOrd, Ord, Eq, PartialEq, Hash)]
pub enum CharacteristicProperty {
    Broadcast,
    Read,
    WriteWithoutResponse,
    Write,
    Notify,
    Indicate,
    AuthenticatedSignedWrites,
    ExtendedProperties,
    NotifyEncryptionRequired,
    IndicateEncryptionRequired,
}

impl CharacteristicProperty {
    pub const ALL: [CharacteristicProperty; 10] = [
        CharacteristicProperty::Broadcast,
        CharacteristicProperty::Read,
        CharacteristicProperty::WriteWithoutResponse,
        CharacteristicProperty::Write,
        CharacteristicProperty::Notify,
        CharacteristicProperty::Indicate,
        CharacteristicProperty::AuthenticatedSignedWrites,
        CharacteristicProperty::ExtendedProperties,
        CharacteristicProperty::NotifyEncryptionRequired,
        CharacteristicProperty::IndicateEncryptionRequired,
    ];

    /// Bit position in the GATT properties field.
    pub const fn bit(self) -> u32 {
        match self {
            CharacteristicProperty::Broadcast => 0x01,
            CharacteristicProperty::Read => 0x02,
            CharacteristicProperty::WriteWithoutResponse => 0x04,
            CharacteristicProperty::Write => 0x08,
            CharacteristicProperty::Notify => 0x10,
            CharacteristicProperty::Indicate => 0x20,
            CharacteristicProperty::AuthenticatedSignedWrites => 0x40,
            CharacteristicProperty::ExtendedProperties => 0x80,
            CharacteristicProperty::NotifyEncryptionRequired => 0x100,
            CharacteristicProperty::IndicateEncryptionRequired => 0x200,
        }
    }
}

/// Raw properties bitmask as reported by the helper.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacteristicProperties(pub u32);

impl CharacteristicProperties {
    pub fn contains(&self, property: CharacteristicProperty) -> bool {
        self.0 & property.bit() != 0
    }

    pub fn iter(&self) -> impl Iterator<Item = CharacteristicProperty> + '_ {
        CharacteristicProperty::ALL
            .into_iter()
            .filter(|property| self.contains(*property))
    }
}

impl FromIterator<CharacteristicProperty> for CharacteristicProperties {
    fn from_iter<I: IntoIterator<Item = CharacteristicProperty>>(iter: I) -> Self {
        CharacteristicProperties(iter.into_iter().fold(0, |bits, p| bits | p.bit()))
    }
}

#[derive(Debug, Clone, Copy, PartialOrd, Ord, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CharacteristicWriteType {
    #[serde(rename = "withResponse")]
    WriteWithResponse,
    #[serde(rename = "withoutResponse")]
    WriteWithoutResponse,
}
