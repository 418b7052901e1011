//! Interface to the hosting compositor.
//!
//! The driver runs as a client of an outer compositor and consumes its
//! display configuration through this boundary. Everything here is a model of
//! what the compositor reports; the driver never owns the real hardware.

/// Orientation of an output or of the hosted window, in compositor terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Normal,
    Left,
    Inverted,
    Right,
}

impl Orientation {
    pub fn degrees(self) -> u16 {
        match self {
            Orientation::Normal => 0,
            Orientation::Left => 90,
            Orientation::Inverted => 180,
            Orientation::Right => 270,
        }
    }

    /// Whether going from `self` to `other` exchanges width and height.
    pub fn swaps_axes_with(self, other: Orientation) -> bool {
        self.degrees() % 180 != other.degrees() % 180
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerMode {
    On,
    Standby,
    Suspend,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputType {
    Unknown,
    Vga,
    Dvi,
    Hdmi,
    DisplayPort,
    Lvds,
    Edp,
}

impl OutputType {
    pub fn name(self) -> &'static str {
        match self {
            OutputType::Unknown => "unknown",
            OutputType::Vga => "VGA",
            OutputType::Dvi => "DVI",
            OutputType::Hdmi => "HDMI",
            OutputType::DisplayPort => "DP",
            OutputType::Lvds => "LVDS",
            OutputType::Edp => "eDP",
        }
    }
}

/// Subpixel arrangement of a panel.
///
/// The compositor-side and window-system-side enumerations are defined to
/// line up, so a reported value passes through without translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubpixelOrder {
    #[default]
    Unknown,
    HorizontalRgb,
    HorizontalBgr,
    VerticalRgb,
    VerticalBgr,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostMode {
    pub width: i32,
    pub height: i32,
    /// Refresh rate in Hz.
    pub refresh: f64,
}

/// One output entry of a configuration snapshot.
#[derive(Debug, Clone)]
pub struct HostOutput {
    pub ty: OutputType,
    pub connection: ConnectionState,
    pub current_mode: Option<HostMode>,
    pub position: (i32, i32),
    pub physical_size_mm: (i32, i32),
    pub subpixel: SubpixelOrder,
    pub orientation: Orientation,
    pub power: PowerMode,
}

/// A display configuration snapshot.
///
/// Snapshots are immutable from the compositor's point of view: refreshing
/// the configuration means obtaining a new value and dropping the old one,
/// never editing in place. The one exception is the power-mode field, which
/// the driver edits locally before handing the whole configuration back
/// through [`HostConnection::apply_display_config`].
#[derive(Debug, Clone, Default)]
pub struct DisplayConfig {
    pub outputs: Vec<HostOutput>,
}

impl DisplayConfig {
    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }
}

/// Live connection to the hosting compositor.
pub trait HostConnection {
    /// Obtains a fresh configuration snapshot.
    fn create_display_config(&self) -> DisplayConfig;

    /// Applies a locally modified configuration to the compositor session.
    fn apply_display_config(&self, config: &DisplayConfig);

    /// Registers the configuration-change notification.
    ///
    /// The compositor may invoke the callback from an arbitrary thread; it
    /// must do nothing beyond posting work back to the main event loop.
    fn set_config_change_callback(&self, callback: Box<dyn Fn() + Send + Sync>);
}

/// The compositor surface backing a hosted window.
pub trait HostSurface {
    fn orientation(&self) -> Orientation;
}
