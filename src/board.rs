//! Board revision detection and the capability descriptor derived from it.
//!
//! Revisions are told apart by a resistor divider sampled once at start-of-day.
//! Production boards print a mirrored divider, so readings above the midpoint
//! are folded back and flagged.

/// Raw access to the revision-strap ADC channel.
#[cfg_attr(test, mockall::automock)]
pub trait Adc {
    /// Take one 12-bit sample. Calibration is the implementor's business.
    fn read(&mut self) -> u16;
}

/// Hardware version number.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Version {
    /// Major revision.
    pub major: u8,
    /// Minor revision.
    pub minor: u8,
}

impl Version {
    /// Build a version number.
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

/// `(revision, highest permille for it)`, ascending. The first threshold not
/// exceeded wins, so order matters as much as the values.
const REVISIONS: [(Option<Version>, u16); 9] = [
    (Some(Version::new(0, 6)), 10),
    (None, 195),
    (Some(Version::new(1, 4)), 220),
    (Some(Version::new(1, 3)), 240),
    (Some(Version::new(1, 2)), 260),
    (Some(Version::new(1, 0)), 280),
    (Some(Version::new(1, 1)), 310),
    (None, 480),
    (Some(Version::new(0, 7)), 510),
];

/// Readings above this are the mirrored production divider.
const PRODUCTION_FOLD: u16 = 510;

/// Convert a 12-bit reading to per mille of the reference, rounded.
pub fn permille(reading: u16) -> u16 {
    (((reading as u32) * 1000 + 20480) >> 12) as u16
}

/// Result of revision detection. Computed once, never updated.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BoardRevision {
    /// `None` when the divider matched no known revision.
    pub version: Option<Version>,
    /// True for boards carrying the mirrored production divider.
    pub is_production_variant: bool,
}

impl BoardRevision {
    /// Sample the strap once and classify it.
    pub fn detect(adc: &mut impl Adc) -> Self {
        let reading = adc.read();
        let revision = Self::from_reading(reading);
        info!(
            "board revision {:?} (reading {}, production {})",
            revision.version,
            reading,
            revision.is_production_variant
        );
        revision
    }

    /// Classify a raw 12-bit reading.
    pub fn from_reading(reading: u16) -> Self {
        Self::from_permille(permille(reading))
    }

    /// Classify a per mille value, folding the production half first.
    pub fn from_permille(permille: u16) -> Self {
        let (permille, is_production_variant) = if permille > PRODUCTION_FOLD {
            (1000u16.saturating_sub(permille), true)
        } else {
            (permille, false)
        };

        let version = REVISIONS
            .iter()
            .find(|(_, threshold)| permille <= *threshold)
            .and_then(|(version, _)| *version);

        Self {
            version,
            is_production_variant,
        }
    }

    /// Revision in USB `bcdDevice` layout, zero when unknown.
    pub fn bcd_device(&self) -> u16 {
        self.version
            .map(|v| (v.major as u16) << 8 | v.minor as u16)
            .unwrap_or(0)
    }

    /// Manufacturer string for the device descriptor.
    pub fn manufacturer(&self) -> &'static str {
        if self.is_production_variant {
            "Great Scott Gadgets"
        } else {
            "Apollo Project"
        }
    }

    /// Product string for the device descriptor.
    pub fn product(&self) -> &'static str {
        if self.is_production_variant {
            "Cynthion Apollo Debugger"
        } else {
            "Apollo Debugger"
        }
    }
}

/// How the shared USB port is switched between MCU and FPGA.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PortSwitch {
    /// No switch; the port stays with the MCU.
    None,
    /// A switch IC selected by a driven line; the MCU sees a detach either way.
    Switched,
    /// The MCU holds a line to keep the port; letting go hands it off.
    OpenDrain,
}

/// How the FPGA asks for the shared port.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvertisementKind {
    /// No advertisement line; ownership is decided at start-of-day and by the button.
    None,
    /// The FPGA toggles a line; edges are counted per window.
    Edges,
    /// The FPGA repeatedly sends `'A'` over a receive-only UART.
    Serial,
}

/// Board capabilities, resolved once at start-of-day.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Capabilities {
    /// Shared-port switching mechanism.
    pub switch: PortSwitch,
    /// The MCU can hold the FPGA's init line to block configuration.
    pub init_control: bool,
    /// Source of FPGA port requests.
    pub advertisement: AdvertisementKind,
}

impl Capabilities {
    /// A board with none of the optional hardware.
    pub const MINIMAL: Self = Self {
        switch: PortSwitch::None,
        init_control: false,
        advertisement: AdvertisementKind::None,
    };

    /// Capabilities of a detected revision. Unknown boards get [`Self::MINIMAL`].
    pub fn from_revision(revision: &BoardRevision) -> Self {
        let Some(version) = revision.version else {
            return Self::MINIMAL;
        };

        let has_switch = version >= Version::new(0, 6);
        Self {
            switch: if has_switch {
                PortSwitch::Switched
            } else {
                PortSwitch::None
            },
            init_control: version >= Version::new(1, 3),
            advertisement: if has_switch {
                AdvertisementKind::Edges
            } else {
                AdvertisementKind::None
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn version_of(permille: u16) -> Option<(u8, u8)> {
        BoardRevision::from_permille(permille)
            .version
            .map(|v| (v.major, v.minor))
    }

    #[test]
    fn classifies_around_table_boundaries() {
        assert_eq!(version_of(5), Some((0, 6)));
        assert_eq!(version_of(10), Some((0, 6)));
        assert_eq!(version_of(11), None);
        assert_eq!(version_of(50), None);
        assert_eq!(version_of(205), Some((1, 4)));
        assert_eq!(version_of(230), Some((1, 3)));
        assert_eq!(version_of(250), Some((1, 2)));
        assert_eq!(version_of(270), Some((1, 0)));
        assert_eq!(version_of(300), Some((1, 1)));
        assert_eq!(version_of(400), None);
        assert_eq!(version_of(480), None);
        assert_eq!(version_of(495), Some((0, 7)));
        assert_eq!(version_of(510), Some((0, 7)));
    }

    #[test]
    fn production_divider_is_mirrored() {
        let rev = BoardRevision::from_permille(700);
        assert!(rev.is_production_variant);
        assert_eq!(rev.version, Some(Version::new(1, 1)));

        let rev = BoardRevision::from_permille(300);
        assert!(!rev.is_production_variant);
        assert_eq!(rev.version, Some(Version::new(1, 1)));

        // Past full scale folds to the bottom of the table.
        assert!(BoardRevision::from_permille(1004).is_production_variant);
    }

    #[test]
    fn reading_is_rounded_to_permille() {
        assert_eq!(permille(0), 5);
        assert_eq!(permille(4095), 1004);
        assert_eq!(permille(1024), 255);
    }

    #[test]
    fn detect_samples_once() {
        let mut adc = MockAdc::new();
        // 230 permille
        adc.expect_read().once().return_const(922u16);
        let rev = BoardRevision::detect(&mut adc);
        assert_eq!(rev.version, Some(Version::new(1, 3)));
        assert_eq!(rev.bcd_device(), 0x0103);
        assert_eq!(rev.product(), "Apollo Debugger");
    }

    #[test]
    fn capabilities_follow_revision() {
        let caps = Capabilities::from_revision(&BoardRevision::from_permille(230));
        assert_eq!(caps.switch, PortSwitch::Switched);
        assert!(caps.init_control);
        assert_eq!(caps.advertisement, AdvertisementKind::Edges);

        let caps = Capabilities::from_revision(&BoardRevision::from_permille(270));
        assert!(!caps.init_control);

        let unknown = BoardRevision::from_permille(50);
        assert_eq!(unknown.bcd_device(), 0);
        assert_eq!(Capabilities::from_revision(&unknown), Capabilities::MINIMAL);
    }
}
