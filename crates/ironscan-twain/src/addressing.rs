use bitflags::bitflags;

/// Data group (`DG_*`), the subsystem a dispatch call is addressed to.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataGroup(u32);

impl DataGroup {
    pub const CONTROL: Self = Self(0x0001);
    pub const IMAGE: Self = Self(0x0002);
    pub const AUDIO: Self = Self(0x0004);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }
}

impl Default for DataGroup {
    fn default() -> Self {
        Self::IMAGE
    }
}

/// Data argument type (`DAT_*`), the kind of payload exchanged.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dat(u16);

impl Dat {
    pub const NULL: Self = Self(0x0000);

    // Control group
    pub const CAPABILITY: Self = Self(0x0001);
    pub const EVENT: Self = Self(0x0002);
    pub const IDENTITY: Self = Self(0x0003);
    pub const PARENT: Self = Self(0x0004);
    pub const PENDING_XFERS: Self = Self(0x0005);
    pub const SETUP_MEM_XFER: Self = Self(0x0006);
    pub const SETUP_FILE_XFER: Self = Self(0x0007);
    pub const STATUS: Self = Self(0x0008);
    pub const USER_INTERFACE: Self = Self(0x0009);
    pub const XFER_GROUP: Self = Self(0x000a);
    pub const CUSTOM_DS_DATA: Self = Self(0x000c);
    pub const DEVICE_EVENT: Self = Self(0x000d);
    pub const FILE_SYSTEM: Self = Self(0x000e);
    pub const PASS_THRU: Self = Self(0x000f);
    pub const CALLBACK: Self = Self(0x0010);
    pub const STATUS_UTF8: Self = Self(0x0011);
    pub const CALLBACK2: Self = Self(0x0012);
    pub const METRICS: Self = Self(0x0013);
    pub const TWAIN_DIRECT: Self = Self(0x0014);

    // Image group
    pub const IMAGE_INFO: Self = Self(0x0101);
    pub const IMAGE_LAYOUT: Self = Self(0x0102);
    pub const IMAGE_MEM_XFER: Self = Self(0x0103);
    pub const IMAGE_NATIVE_XFER: Self = Self(0x0104);
    pub const IMAGE_FILE_XFER: Self = Self(0x0105);
    pub const CIE_COLOR: Self = Self(0x0106);
    pub const GRAY_RESPONSE: Self = Self(0x0107);
    pub const RGB_RESPONSE: Self = Self(0x0108);
    pub const JPEG_COMPRESSION: Self = Self(0x0109);
    pub const PALETTE8: Self = Self(0x010a);
    pub const EXT_IMAGE_INFO: Self = Self(0x010b);
    pub const FILTER: Self = Self(0x010c);

    // Audio group
    pub const AUDIO_FILE_XFER: Self = Self(0x0201);
    pub const AUDIO_INFO: Self = Self(0x0202);
    pub const AUDIO_NATIVE_XFER: Self = Self(0x0203);

    // Protocol 1.9 and later
    pub const ICC_PROFILE: Self = Self(0x0401);
    pub const IMAGE_MEM_FILE_XFER: Self = Self(0x0402);
    pub const ENTRY_POINT: Self = Self(0x0403);

    /// First value available for vendor-specific data types.
    pub const CUSTOM_BASE: Self = Self(0x8000);

    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u16 {
        self.0
    }

    pub fn is_custom(self) -> bool {
        self >= Self::CUSTOM_BASE
    }
}

/// Message (`MSG_*`), the action to perform on the addressed payload.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Msg(u16);

impl Msg {
    pub const NULL: Self = Self(0x0000);

    // Generic
    pub const GET: Self = Self(0x0001);
    pub const GET_CURRENT: Self = Self(0x0002);
    pub const GET_DEFAULT: Self = Self(0x0003);
    pub const GET_FIRST: Self = Self(0x0004);
    pub const GET_NEXT: Self = Self(0x0005);
    pub const SET: Self = Self(0x0006);
    pub const RESET: Self = Self(0x0007);
    pub const QUERY_SUPPORT: Self = Self(0x0008);
    pub const GET_HELP: Self = Self(0x0009);
    pub const GET_LABEL: Self = Self(0x000a);
    pub const GET_LABEL_ENUM: Self = Self(0x000b);
    pub const SET_CONSTRAINT: Self = Self(0x000c);

    // Readiness notifications, sent by the source
    pub const XFER_READY: Self = Self(0x0101);
    pub const CLOSE_DS_REQ: Self = Self(0x0102);
    pub const CLOSE_DS_OK: Self = Self(0x0103);
    pub const DEVICE_EVENT: Self = Self(0x0104);

    // Parent
    pub const OPEN_DSM: Self = Self(0x0301);
    pub const CLOSE_DSM: Self = Self(0x0302);

    // Identity
    pub const OPEN_DS: Self = Self(0x0401);
    pub const CLOSE_DS: Self = Self(0x0402);
    pub const USER_SELECT: Self = Self(0x0403);

    // User interface
    pub const DISABLE_DS: Self = Self(0x0501);
    pub const ENABLE_DS: Self = Self(0x0502);
    pub const ENABLE_DS_UI_ONLY: Self = Self(0x0503);

    // Event
    pub const PROCESS_EVENT: Self = Self(0x0601);

    // Pending transfers
    pub const END_XFER: Self = Self(0x0701);
    pub const STOP_FEEDER: Self = Self(0x0702);

    // File system
    pub const CHANGE_DIRECTORY: Self = Self(0x0801);
    pub const CREATE_DIRECTORY: Self = Self(0x0802);
    pub const DELETE: Self = Self(0x0803);
    pub const FORMAT_MEDIA: Self = Self(0x0804);
    pub const GET_CLOSE: Self = Self(0x0805);
    pub const GET_FIRST_FILE: Self = Self(0x0806);
    pub const GET_INFO: Self = Self(0x0807);
    pub const GET_NEXT_FILE: Self = Self(0x0808);
    pub const RENAME: Self = Self(0x0809);
    pub const COPY: Self = Self(0x080a);
    pub const AUTOMATIC_CAPTURE_DIRECTORY: Self = Self(0x080b);

    pub const PASS_THRU: Self = Self(0x0901);
    pub const REGISTER_CALLBACK: Self = Self(0x0902);

    // Capability
    pub const RESET_ALL: Self = Self(0x0a01);

    pub const CUSTOM_BASE: Self = Self(0x0100);

    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u16 {
        self.0
    }

    /// Whether this message is one of the three readiness notifications a source may post.
    pub fn is_readiness(self) -> bool {
        matches!(self, Self::XFER_READY | Self::CLOSE_DS_OK | Self::CLOSE_DS_REQ)
    }
}

bitflags! {
    /// `SupportedGroups` field of an [`Identity`](crate::Identity).
    ///
    /// Besides the data groups, the high bits advertise protocol-version-2 support of each party.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct SupportedGroups: u32 {
        const CONTROL = 0x0000_0001;
        const IMAGE = 0x0000_0002;
        const AUDIO = 0x0000_0004;
        /// Set by the data source manager when it speaks protocol version 2.
        const DSM2 = 0x1000_0000;
        /// Set by an application speaking protocol version 2.
        const APP2 = 0x2000_0000;
        /// Set by a data source speaking protocol version 2.
        const DS2 = 0x4000_0000;

        const _ = !0;
    }
}
