use crate::{FixedStr, Str32, SupportedGroups, PROTOCOL_MAJOR, PROTOCOL_MINOR};

/// Identifier assigned by the data source manager to every registered party.
///
/// It is pointer sized on macOS and 32 bits everywhere else.
#[cfg(target_os = "macos")]
pub type IdentityId = usize;

#[cfg(not(target_os = "macos"))]
pub type IdentityId = u32;

/// `TW_VERSION`
#[repr(C, packed(2))]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Version {
    major: u16,
    minor: u16,
    language: u16,
    country: u16,
    info: Str32,
}

impl Version {
    /// `TWLG_ENGLISH_USA`
    pub const LANGUAGE_ENGLISH_USA: u16 = 13;
    /// `TWCY_USA`
    pub const COUNTRY_USA: u16 = 1;

    pub fn new(major: u16, minor: u16, info: &str) -> Self {
        Self {
            major,
            minor,
            language: Self::LANGUAGE_ENGLISH_USA,
            country: Self::COUNTRY_USA,
            info: FixedStr::new(info),
        }
    }

    #[must_use]
    pub fn with_locale(mut self, language: u16, country: u16) -> Self {
        self.language = language;
        self.country = country;
        self
    }

    pub fn major(&self) -> u16 {
        self.major
    }

    pub fn minor(&self) -> u16 {
        self.minor
    }

    pub fn language(&self) -> u16 {
        self.language
    }

    pub fn country(&self) -> u16 {
        self.country
    }

    pub fn info(&self) -> Str32 {
        self.info
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::new(1, 0, "")
    }
}

impl core::fmt::Debug for Version {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Version")
            .field("major", &self.major())
            .field("minor", &self.minor())
            .field("language", &self.language())
            .field("country", &self.country())
            .field("info", &self.info())
            .finish()
    }
}

/// `TW_IDENTITY`, the record describing the application, the manager, or a data source.
///
/// Fields live in a packed record shared with native code, hence the copying accessors.
#[repr(C, packed(2))]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    id: IdentityId,
    version: Version,
    protocol_major: u16,
    protocol_minor: u16,
    supported_groups: u32,
    manufacturer: Str32,
    product_family: Str32,
    product_name: Str32,
}

impl Identity {
    /// An all-zero identity, filled in by the data source manager on output.
    pub const fn empty() -> Self {
        Self {
            id: 0,
            version: Version {
                major: 0,
                minor: 0,
                language: 0,
                country: 0,
                info: FixedStr::empty(),
            },
            protocol_major: 0,
            protocol_minor: 0,
            supported_groups: 0,
            manufacturer: FixedStr::empty(),
            product_family: FixedStr::empty(),
            product_name: FixedStr::empty(),
        }
    }

    /// Identity of the calling application.
    ///
    /// The current protocol version is filled in and `APP2` is always advertised, so that a
    /// version 2 manager reports itself through `DSM2` and hands out its memory entry points.
    pub fn application(
        version: Version,
        groups: SupportedGroups,
        manufacturer: &str,
        product_family: &str,
        product_name: &str,
    ) -> Self {
        Self {
            id: 0,
            version,
            protocol_major: PROTOCOL_MAJOR,
            protocol_minor: PROTOCOL_MINOR,
            supported_groups: (groups | SupportedGroups::CONTROL | SupportedGroups::APP2).bits(),
            manufacturer: FixedStr::new(manufacturer),
            product_family: FixedStr::new(product_family),
            product_name: FixedStr::new(product_name),
        }
    }

    /// Identity used to ask the data source manager for a source by name.
    pub fn source_request(product_name: &str, manufacturer: &str) -> Self {
        let mut identity = Self::empty();
        identity.manufacturer = FixedStr::new(manufacturer);
        identity.product_name = FixedStr::new(product_name);
        identity
    }

    pub fn id(&self) -> IdentityId {
        self.id
    }

    pub fn set_id(&mut self, id: IdentityId) {
        self.id = id;
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn protocol_major(&self) -> u16 {
        self.protocol_major
    }

    pub fn protocol_minor(&self) -> u16 {
        self.protocol_minor
    }

    pub fn supported_groups(&self) -> SupportedGroups {
        SupportedGroups::from_bits_retain(self.supported_groups)
    }

    pub fn set_supported_groups(&mut self, groups: SupportedGroups) {
        self.supported_groups = groups.bits();
    }

    pub fn manufacturer(&self) -> Str32 {
        self.manufacturer
    }

    pub fn product_family(&self) -> Str32 {
        self.product_family
    }

    pub fn product_name(&self) -> Str32 {
        self.product_name
    }

    pub fn set_product_name(&mut self, name: &str) {
        self.product_name = FixedStr::new(name);
    }

    pub fn set_manufacturer(&mut self, manufacturer: &str) {
        self.manufacturer = FixedStr::new(manufacturer);
    }

    /// Whether the data source manager reported protocol version 2 support.
    pub fn is_dsm2(&self) -> bool {
        self.supported_groups().contains(SupportedGroups::DSM2)
    }

    pub fn is_app2(&self) -> bool {
        self.supported_groups().contains(SupportedGroups::APP2)
    }

    pub fn is_ds2(&self) -> bool {
        self.supported_groups().contains(SupportedGroups::DS2)
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::empty()
    }
}

impl core::fmt::Debug for Identity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id())
            .field("version", &self.version())
            .field("protocol_major", &self.protocol_major())
            .field("protocol_minor", &self.protocol_minor())
            .field("supported_groups", &self.supported_groups())
            .field("manufacturer", &self.manufacturer())
            .field("product_family", &self.product_family())
            .field("product_name", &self.product_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_advertises_version_two() {
        let identity = Identity::application(
            Version::new(1, 2, "1.2"),
            SupportedGroups::IMAGE,
            "Devolutions",
            "Imaging",
            "Scanner",
        );

        assert!(identity.is_app2());
        assert!(!identity.is_dsm2());
        assert!(identity.supported_groups().contains(SupportedGroups::CONTROL));
        assert_eq!(identity.protocol_major(), PROTOCOL_MAJOR);
        assert_eq!(identity.protocol_minor(), PROTOCOL_MINOR);
        assert_eq!(identity.product_name(), "Scanner");
        assert_eq!(identity.id(), 0);
    }

    #[test]
    fn source_request_carries_names_only() {
        let identity = Identity::source_request("Flatbed", "Acme");

        assert_eq!(identity.product_name(), "Flatbed");
        assert_eq!(identity.manufacturer(), "Acme");
        assert!(identity.product_family().is_empty());
        assert_eq!(identity.supported_groups(), SupportedGroups::empty());
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn native_layout() {
        // 4 + (8 + 34) + 2 + 2 + 4 + 3 * 34
        assert_eq!(size_of::<Identity>(), 156);
        assert_eq!(align_of::<Identity>(), 2);
    }
}
