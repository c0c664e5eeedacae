use core::fmt;

/// State of the data source manager session, as seen by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum DsmState {
    /// The manager library is not loaded (TWAIN state 1).
    #[default]
    PreSession,
    /// The manager library is loaded and its entry point resolved (state 2).
    Loaded,
    /// `OpenDsm` succeeded (state 3).
    Open,
}

impl DsmState {
    pub fn name(self) -> &'static str {
        match self {
            Self::PreSession => "PreSession",
            Self::Loaded => "Loaded",
            Self::Open => "Open",
        }
    }
}

impl fmt::Display for DsmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State of a single data source session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum DsState {
    /// The source is known but not open (TWAIN state 3).
    #[default]
    Closed,
    /// `OpenDs` succeeded; capabilities may be negotiated (state 4).
    Open,
    /// The source is enabled and its user interface, if any, is active (state 5).
    Enabled,
    /// The source signalled that data is ready to be transferred (state 6).
    XferReady,
    /// A transfer is in progress (state 7).
    Xferring,
}

impl DsState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Closed => "Closed",
            Self::Open => "Open",
            Self::Enabled => "Enabled",
            Self::XferReady => "XferReady",
            Self::Xferring => "Xferring",
        }
    }
}

impl fmt::Display for DsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
