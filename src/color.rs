//! Color profiles: ICC blobs and NCLX (CICP) descriptions

use bytemuck::{Pod, Zeroable};
use whereat::at;

use crate::error::{Error, HeifError, Result, subcode};

/// Color primaries (ITU-T H.273)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ColorPrimaries(pub u16);

#[allow(missing_docs)]
impl ColorPrimaries {
    pub const BT709: Self = Self(1);
    pub const UNSPECIFIED: Self = Self(2);
    pub const BT470M: Self = Self(4);
    pub const BT470BG: Self = Self(5);
    pub const BT601: Self = Self(6);
    pub const SMPTE240: Self = Self(7);
    pub const FILM: Self = Self(8);
    pub const BT2020: Self = Self(9);
    pub const XYZ: Self = Self(10);
    pub const SMPTE431: Self = Self(11);
    pub const SMPTE432: Self = Self(12);
    pub const EBU3213: Self = Self(22);
}

/// Transfer characteristics (ITU-T H.273)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TransferCharacteristics(pub u16);

#[allow(missing_docs)]
impl TransferCharacteristics {
    pub const BT709: Self = Self(1);
    pub const UNSPECIFIED: Self = Self(2);
    pub const BT470M: Self = Self(4);
    pub const BT470BG: Self = Self(5);
    pub const BT601: Self = Self(6);
    pub const SMPTE240: Self = Self(7);
    pub const LINEAR: Self = Self(8);
    pub const LOG100: Self = Self(9);
    pub const LOG100_SQRT10: Self = Self(10);
    pub const IEC61966: Self = Self(11);
    pub const BT1361: Self = Self(12);
    pub const SRGB: Self = Self(13);
    pub const BT2020_10BIT: Self = Self(14);
    pub const BT2020_12BIT: Self = Self(15);
    pub const SMPTE2084: Self = Self(16);
    pub const SMPTE428: Self = Self(17);
    pub const HLG: Self = Self(18);
}

/// Matrix coefficients (ITU-T H.273)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MatrixCoefficients(pub u16);

#[allow(missing_docs)]
impl MatrixCoefficients {
    pub const IDENTITY: Self = Self(0);
    pub const BT709: Self = Self(1);
    pub const UNSPECIFIED: Self = Self(2);
    pub const FCC: Self = Self(4);
    pub const BT470BG: Self = Self(5);
    pub const BT601: Self = Self(6);
    pub const SMPTE240: Self = Self(7);
    pub const YCGCO: Self = Self(8);
    pub const BT2020_NCL: Self = Self(9);
    pub const BT2020_CL: Self = Self(10);
    pub const SMPTE2085: Self = Self(11);
    pub const CHROMAT_NCL: Self = Self(12);
    pub const CHROMAT_CL: Self = Self(13);
    pub const ICTCP: Self = Self(14);
}

/// CIE xy chromaticity coordinates of the primaries and white point
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[allow(missing_docs)]
pub struct Chromaticities {
    pub red: (f32, f32),
    pub green: (f32, f32),
    pub blue: (f32, f32),
    pub white: (f32, f32),
}

impl Chromaticities {
    /// BT.709 / sRGB primaries with a D65 white point
    pub const BT709: Chromaticities = Chromaticities {
        red: (0.64, 0.33),
        green: (0.30, 0.60),
        blue: (0.15, 0.06),
        white: (0.3127, 0.3290),
    };
}

/// An NCLX color description
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NclxProfile {
    /// Color primaries
    pub color_primaries: ColorPrimaries,
    /// Transfer characteristics
    pub transfer_characteristics: TransferCharacteristics,
    /// Matrix coefficients
    pub matrix_coefficients: MatrixCoefficients,
    /// Full range flag
    pub full_range: bool,
    /// Primaries derived from `color_primaries`
    pub chromaticities: Chromaticities,
}

impl Default for NclxProfile {
    /// sRGB, what libheif writes when no profile is set
    fn default() -> Self {
        Self {
            color_primaries: ColorPrimaries::BT709,
            transfer_characteristics: TransferCharacteristics::SRGB,
            matrix_coefficients: MatrixCoefficients::BT601,
            full_range: true,
            chromaticities: Chromaticities::BT709,
        }
    }
}

/// Binary layout of `struct heif_color_profile_nclx` (version 1)
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct RawNclx {
    version: u8,
    _pad0: [u8; 3],
    color_primaries: i32,
    transfer_characteristics: i32,
    matrix_coefficients: i32,
    full_range_flag: u8,
    _pad1: [u8; 3],
    chromaticities: [f32; 8],
}

impl NclxProfile {
    /// Size of the serialized profile
    pub const SERIALIZED_LEN: usize = core::mem::size_of::<RawNclx>();

    /// Serialize into the native struct layout (native endianness)
    pub fn to_bytes(&self) -> Vec<u8> {
        let c = &self.chromaticities;
        let raw = RawNclx {
            version: 1,
            _pad0: [0; 3],
            color_primaries: self.color_primaries.0 as i32,
            transfer_characteristics: self.transfer_characteristics.0 as i32,
            matrix_coefficients: self.matrix_coefficients.0 as i32,
            full_range_flag: self.full_range as u8,
            _pad1: [0; 3],
            chromaticities: [
                c.red.0, c.red.1, c.green.0, c.green.1, c.blue.0, c.blue.1, c.white.0, c.white.1,
            ],
        };
        bytemuck::bytes_of(&raw).to_vec()
    }

    /// Parse the native struct layout
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: RawNclx = bytemuck::try_pod_read_unaligned(bytes).map_err(|_| {
            at(Error::from(HeifError::invalid_input(
                subcode::UNSPECIFIED,
                format!(
                    "NCLX profile must be {} bytes, got {}",
                    Self::SERIALIZED_LEN,
                    bytes.len()
                ),
            )))
        })?;
        let field = |v: i32| u16::try_from(v).unwrap_or(2);
        let p = raw.chromaticities;
        Ok(Self {
            color_primaries: ColorPrimaries(field(raw.color_primaries)),
            transfer_characteristics: TransferCharacteristics(field(raw.transfer_characteristics)),
            matrix_coefficients: MatrixCoefficients(field(raw.matrix_coefficients)),
            full_range: raw.full_range_flag != 0,
            chromaticities: Chromaticities {
                red: (p[0], p[1]),
                green: (p[2], p[3]),
                blue: (p[4], p[5]),
                white: (p[6], p[7]),
            },
        })
    }
}

/// Color profile attached to an image
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ColorProfile {
    /// No profile
    #[default]
    None,
    /// Restricted ICC profile (`rICC`)
    IccRestricted(Vec<u8>),
    /// Unrestricted ICC profile (`prof`)
    IccFull(Vec<u8>),
    /// NCLX description
    Nclx(NclxProfile),
}

impl ColorProfile {
    /// Build an ICC profile from its box type, `"rICC"` or `"prof"`
    pub fn from_icc(profile_type: &str, data: Vec<u8>) -> Result<Self> {
        match profile_type {
            "rICC" => Ok(ColorProfile::IccRestricted(data)),
            "prof" => Ok(ColorProfile::IccFull(data)),
            other => Err(at(Error::from(HeifError::usage(
                subcode::UNSPECIFIED,
                format!("Unknown ICC profile type `{other}`"),
            )))),
        }
    }

    /// ICC bytes, when the profile is ICC
    pub fn icc(&self) -> Option<&[u8]> {
        match self {
            ColorProfile::IccRestricted(d) | ColorProfile::IccFull(d) => Some(d),
            _ => None,
        }
    }

    /// Box type of an ICC profile
    pub fn icc_type(&self) -> Option<&'static str> {
        match self {
            ColorProfile::IccRestricted(_) => Some("rICC"),
            ColorProfile::IccFull(_) => Some("prof"),
            _ => None,
        }
    }

    /// NCLX description, when present
    pub fn nclx(&self) -> Option<&NclxProfile> {
        match self {
            ColorProfile::Nclx(n) => Some(n),
            _ => None,
        }
    }

    /// `true` when no profile is attached
    pub fn is_none(&self) -> bool {
        matches!(self, ColorProfile::None)
    }
}
