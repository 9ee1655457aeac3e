use serde::{Deserialize, Serialize};

use crate::config::VitalDefaults;

/// A raw form value: numeric when the referral form validated it, text otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Numeric reading of the value. `None` for non-numeric or non-finite input.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n).filter(|v| v.is_finite()),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }

    /// Blank text counts as missing, not as a parse failure.
    pub fn is_blank(&self) -> bool {
        matches!(self, FieldValue::Text(s) if s.trim().is_empty())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// The eight vital-sign fields recorded on a referral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalType {
    Weight,
    Height,
    SystolicBp,
    DiastolicBp,
    PulseRate,
    RespiratoryRate,
    Temperature,
    OxygenSaturation,
}

impl VitalType {
    /// Column order used by the time regressor.
    pub const ALL: [VitalType; 8] = [
        VitalType::Weight,
        VitalType::Height,
        VitalType::SystolicBp,
        VitalType::DiastolicBp,
        VitalType::PulseRate,
        VitalType::RespiratoryRate,
        VitalType::Temperature,
        VitalType::OxygenSaturation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VitalType::Weight => "weight",
            VitalType::Height => "height",
            VitalType::SystolicBp => "systolic_bp",
            VitalType::DiastolicBp => "diastolic_bp",
            VitalType::PulseRate => "pulse_rate",
            VitalType::RespiratoryRate => "respiratory_rate",
            VitalType::Temperature => "temperature",
            VitalType::OxygenSaturation => "oxygen_saturation",
        }
    }

    /// Imputed value when the field is left blank.
    pub fn default_value(self, defaults: &VitalDefaults) -> f32 {
        match self {
            VitalType::Weight => defaults.weight_kg,
            VitalType::Height => defaults.height_cm,
            VitalType::SystolicBp => defaults.systolic_bp,
            VitalType::DiastolicBp => defaults.diastolic_bp,
            VitalType::PulseRate => defaults.pulse_rate,
            VitalType::RespiratoryRate => defaults.respiratory_rate,
            VitalType::Temperature => defaults.temperature_c,
            VitalType::OxygenSaturation => defaults.oxygen_saturation,
        }
    }
}

/// Vital signs as captured on the referral form. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VitalSigns {
    pub weight: Option<FieldValue>,
    pub height: Option<FieldValue>,
    pub systolic_bp: Option<FieldValue>,
    pub diastolic_bp: Option<FieldValue>,
    pub pulse_rate: Option<FieldValue>,
    pub respiratory_rate: Option<FieldValue>,
    pub temperature: Option<FieldValue>,
    pub oxygen_saturation: Option<FieldValue>,
}

impl VitalSigns {
    pub fn get(&self, vital: VitalType) -> Option<&FieldValue> {
        match vital {
            VitalType::Weight => self.weight.as_ref(),
            VitalType::Height => self.height.as_ref(),
            VitalType::SystolicBp => self.systolic_bp.as_ref(),
            VitalType::DiastolicBp => self.diastolic_bp.as_ref(),
            VitalType::PulseRate => self.pulse_rate.as_ref(),
            VitalType::RespiratoryRate => self.respiratory_rate.as_ref(),
            VitalType::Temperature => self.temperature.as_ref(),
            VitalType::OxygenSaturation => self.oxygen_saturation.as_ref(),
        }
    }

    /// Coerce every field to a number, imputing blanks.
    ///
    /// Returns the first field that holds non-numeric text.
    pub fn coerce(&self, defaults: &VitalDefaults) -> Result<[f32; 8], (VitalType, String)> {
        let mut out = [0.0f32; 8];
        for (slot, vital) in out.iter_mut().zip(VitalType::ALL) {
            *slot = match self.get(vital) {
                None => vital.default_value(defaults),
                Some(value) if value.is_blank() => vital.default_value(defaults),
                Some(value) => match value.as_number() {
                    Some(n) => n as f32,
                    None => {
                        let raw = match value {
                            FieldValue::Text(s) => s.clone(),
                            FieldValue::Number(n) => n.to_string(),
                        };
                        return Err((vital, raw));
                    }
                },
            };
        }
        Ok(out)
    }
}
