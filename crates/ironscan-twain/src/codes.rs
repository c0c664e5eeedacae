use core::fmt;

/// Result of a dispatch call (`TWRC_*`).
///
/// Every operation talking to the data source manager surfaces this value verbatim. The
/// application side never invents new codes, it only attaches local state consequences to them.
#[must_use]
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReturnCode(u16);

impl ReturnCode {
    pub const SUCCESS: Self = Self(0);
    pub const FAILURE: Self = Self(1);
    /// The operation partially succeeded; the data source adjusted some of the values.
    pub const CHECK_STATUS: Self = Self(2);
    pub const CANCEL: Self = Self(3);
    /// The forwarded event belonged to the data source and was consumed.
    pub const DS_EVENT: Self = Self(4);
    /// The forwarded event was not meant for the data source, the application must process it.
    pub const NOT_DS_EVENT: Self = Self(5);
    pub const XFER_DONE: Self = Self(6);
    pub const END_OF_LIST: Self = Self(7);
    pub const INFO_NOT_SUPPORTED: Self = Self(8);
    pub const DATA_NOT_AVAILABLE: Self = Self(9);
    pub const BUSY: Self = Self(10);
    pub const SCANNER_LOCKED: Self = Self(11);

    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u16 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::SUCCESS => "Success",
            Self::FAILURE => "Failure",
            Self::CHECK_STATUS => "CheckStatus",
            Self::CANCEL => "Cancel",
            Self::DS_EVENT => "DsEvent",
            Self::NOT_DS_EVENT => "NotDsEvent",
            Self::XFER_DONE => "XferDone",
            Self::END_OF_LIST => "EndOfList",
            Self::INFO_NOT_SUPPORTED => "InfoNotSupported",
            Self::DATA_NOT_AVAILABLE => "DataNotAvailable",
            Self::BUSY => "Busy",
            Self::SCANNER_LOCKED => "ScannerLocked",
            _ => return None,
        };

        Some(name)
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "ReturnCode({})", self.0),
        }
    }
}

/// Detailed reason of the last failure (`TWCC_*`), obtained through `Dat::STATUS`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ConditionCode(u16);

impl ConditionCode {
    pub const SUCCESS: Self = Self(0);
    pub const BUMMER: Self = Self(1);
    pub const LOW_MEMORY: Self = Self(2);
    pub const NO_DS: Self = Self(3);
    pub const MAX_CONNECTIONS: Self = Self(4);
    pub const OPERATION_ERROR: Self = Self(5);
    pub const BAD_CAP: Self = Self(6);
    pub const BAD_PROTOCOL: Self = Self(9);
    pub const BAD_VALUE: Self = Self(10);
    pub const SEQ_ERROR: Self = Self(11);
    pub const BAD_DEST: Self = Self(12);
    pub const CAP_UNSUPPORTED: Self = Self(13);
    pub const CAP_BAD_OPERATION: Self = Self(14);
    pub const CAP_SEQ_ERROR: Self = Self(15);
    pub const DENIED: Self = Self(16);
    pub const FILE_EXISTS: Self = Self(17);
    pub const FILE_NOT_FOUND: Self = Self(18);
    pub const NOT_EMPTY: Self = Self(19);
    pub const PAPER_JAM: Self = Self(20);
    pub const PAPER_DOUBLE_FEED: Self = Self(21);
    pub const FILE_WRITE_ERROR: Self = Self(22);
    pub const CHECK_DEVICE_ONLINE: Self = Self(23);
    pub const INTERLOCK: Self = Self(24);
    pub const DAMAGED_CORNER: Self = Self(25);
    pub const FOCUS_ERROR: Self = Self(26);
    pub const DOC_TOO_LIGHT: Self = Self(27);
    pub const DOC_TOO_DARK: Self = Self(28);
    pub const NO_MEDIA: Self = Self(29);

    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u16 {
        self.0
    }
}
