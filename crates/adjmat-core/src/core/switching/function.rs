use thiserror::Error;

/// Raw weight below which an implicit cutoff is placed when `D_MAX` is not
/// given explicitly.
const DECAY_FLOOR: f64 = 1e-6;

/// Distances below this are treated as zero separation; the derivative is
/// reported per unit distance and would otherwise blow up.
const NEAR_ZERO_DISTANCE: f64 = 1e-10;

#[derive(Debug, Error, PartialEq)]
pub enum SwitchError {
    #[error("Empty switching function specification")]
    Empty,
    #[error("Unknown switching function type '{0}'")]
    UnknownKind(String),
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Unknown parameter '{0}'")]
    UnknownParameter(String),
    #[error("Malformed field '{0}': expected KEY=VALUE")]
    Malformed(String),
    #[error("Invalid value '{value}' for parameter {name}")]
    InvalidValue { name: &'static str, value: String },
    #[error("Parameter {name} must be {constraint}")]
    OutOfRange {
        name: &'static str,
        constraint: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Shape {
    Rational { nn: i32, mm: i32 },
    Exponential,
    Gaussian,
}

impl Shape {
    /// Value and derivative of the unstretched shape at the reduced distance
    /// x = (r - d0) / r0, for x >= 0.
    fn raw(&self, x: f64) -> (f64, f64) {
        match *self {
            Shape::Rational { nn, mm } => {
                if (x - 1.0).abs() < 1e-8 {
                    // (1 - x^n)/(1 - x^m) has a removable singularity at
                    // x = 1; value and slope follow from the series there.
                    let n = f64::from(nn);
                    let m = f64::from(mm);
                    (n / m, n * (n - m) / (2.0 * m))
                } else {
                    let xn = x.powi(nn);
                    let xm = x.powi(mm);
                    let value = (1.0 - xn) / (1.0 - xm);
                    let derivative = (-f64::from(nn) * xn / x * (1.0 - xm)
                        + f64::from(mm) * xm / x * (1.0 - xn))
                        / ((1.0 - xm) * (1.0 - xm));
                    (value, derivative)
                }
            }
            Shape::Exponential => {
                let value = (-x).exp();
                (value, -value)
            }
            Shape::Gaussian => {
                let value = (-0.5 * x * x).exp();
                (value, -x * value)
            }
        }
    }

    /// Reduced distance at which the raw shape has decayed to
    /// [`DECAY_FLOOR`], used when no explicit `D_MAX` is supplied.
    fn implicit_reach(&self) -> f64 {
        match *self {
            Shape::Rational { nn, mm } => DECAY_FLOOR.powf(-1.0 / f64::from(mm - nn)),
            Shape::Exponential => -DECAY_FLOOR.ln(),
            Shape::Gaussian => (-2.0 * DECAY_FLOOR.ln()).sqrt(),
        }
    }
}

/// A smooth distance-decay function with a hard cutoff.
///
/// The value is exactly 1 at zero separation, monotonically non-increasing,
/// and exactly 0 at and beyond [`SwitchingFunction::dmax`]; both value and
/// derivative vanish past the cutoff. This is achieved by rescaling the raw
/// shape s as s*(r) = (s(r) - s(dmax)) / (s(0) - s(dmax)) once at parse time.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchingFunction {
    shape: Shape,
    d0: f64,
    r0: f64,
    dmax: f64,
    // Raw value at the cutoff and the normalization s(0) - s(dmax).
    floor: f64,
    norm: f64,
}

impl SwitchingFunction {
    /// Parses a textual specification such as
    /// `RATIONAL R_0=1.0 NN=6 MM=12 D_MAX=2.0`.
    ///
    /// The first token selects the shape (`RATIONAL`, `EXP` or `GAUSSIAN`);
    /// the remaining tokens are `KEY=VALUE` parameters. `R_0` is required;
    /// `D_0` defaults to 0; `NN` (default 6) and `MM` (default 2·NN) apply to
    /// `RATIONAL` only. When `D_MAX` is absent the cutoff is placed where the
    /// raw shape has decayed to 1e-6.
    pub fn parse(spec: &str) -> Result<Self, SwitchError> {
        let mut tokens = spec.split_whitespace();
        let kind = tokens.next().ok_or(SwitchError::Empty)?;

        let mut r0 = None;
        let mut d0 = 0.0;
        let mut nn = None;
        let mut mm = None;
        let mut dmax = None;
        for token in tokens {
            let (key, value) = token
                .split_once('=')
                .ok_or_else(|| SwitchError::Malformed(token.to_string()))?;
            match key {
                "R_0" => r0 = Some(parse_float("R_0", value)?),
                "D_0" => d0 = parse_float("D_0", value)?,
                "D_MAX" => dmax = Some(parse_float("D_MAX", value)?),
                "NN" => nn = Some(parse_int("NN", value)?),
                "MM" => mm = Some(parse_int("MM", value)?),
                _ => return Err(SwitchError::UnknownParameter(key.to_string())),
            }
        }

        let shape = match kind {
            "RATIONAL" => {
                let nn = nn.unwrap_or(6);
                let mm = mm.unwrap_or(2 * nn);
                if nn < 1 {
                    return Err(SwitchError::OutOfRange {
                        name: "NN",
                        constraint: "at least 1",
                    });
                }
                if mm <= nn {
                    return Err(SwitchError::OutOfRange {
                        name: "MM",
                        constraint: "greater than NN",
                    });
                }
                Shape::Rational { nn, mm }
            }
            "EXP" | "GAUSSIAN" => {
                if nn.is_some() || mm.is_some() {
                    return Err(SwitchError::UnknownParameter(
                        if nn.is_some() { "NN" } else { "MM" }.to_string(),
                    ));
                }
                if kind == "EXP" {
                    Shape::Exponential
                } else {
                    Shape::Gaussian
                }
            }
            other => return Err(SwitchError::UnknownKind(other.to_string())),
        };

        let r0 = r0.ok_or(SwitchError::MissingParameter("R_0"))?;
        if r0 <= 0.0 {
            return Err(SwitchError::OutOfRange {
                name: "R_0",
                constraint: "positive",
            });
        }
        let dmax = match dmax {
            Some(dmax) => {
                if dmax <= d0 {
                    return Err(SwitchError::OutOfRange {
                        name: "D_MAX",
                        constraint: "greater than D_0",
                    });
                }
                dmax
            }
            None => d0 + r0 * shape.implicit_reach(),
        };

        let (floor, _) = shape.raw((dmax - d0) / r0);
        Ok(Self {
            shape,
            d0,
            r0,
            dmax,
            floor,
            norm: 1.0 - floor,
        })
    }

    /// The cutoff distance beyond which the weight is exactly zero.
    pub fn dmax(&self) -> f64 {
        self.dmax
    }

    /// Evaluates the function at a distance.
    ///
    /// Returns `(weight, dfunc)` where `dfunc` is the derivative of the
    /// weight with respect to distance, divided by the distance, so that the
    /// gradient with respect to an endpoint position is `±dfunc` times the
    /// displacement vector.
    pub fn calculate(&self, distance: f64) -> (f64, f64) {
        if distance >= self.dmax {
            return (0.0, 0.0);
        }
        if distance <= self.d0 || distance < NEAR_ZERO_DISTANCE {
            return ((1.0 - self.floor) / self.norm, 0.0);
        }
        let x = (distance - self.d0) / self.r0;
        let (raw, raw_derivative) = self.shape.raw(x);
        let weight = (raw - self.floor) / self.norm;
        let dfunc = raw_derivative / (self.r0 * self.norm * distance);
        (weight, dfunc)
    }

    /// A human-readable summary used in log output.
    pub fn description(&self) -> String {
        match self.shape {
            Shape::Rational { nn, mm } => format!(
                "RATIONAL with D_0={} R_0={} NN={} MM={}, cutoff {}",
                self.d0, self.r0, nn, mm, self.dmax
            ),
            Shape::Exponential => format!(
                "EXP with D_0={} R_0={}, cutoff {}",
                self.d0, self.r0, self.dmax
            ),
            Shape::Gaussian => format!(
                "GAUSSIAN with D_0={} R_0={}, cutoff {}",
                self.d0, self.r0, self.dmax
            ),
        }
    }
}

fn parse_float(name: &'static str, value: &str) -> Result<f64, SwitchError> {
    value.parse().map_err(|_| SwitchError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

fn parse_int(name: &'static str, value: &str) -> Result<i32, SwitchError> {
    value.parse().map_err(|_| SwitchError::InvalidValue {
        name,
        value: value.to_string(),
    })
}
