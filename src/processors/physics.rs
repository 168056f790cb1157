//! Normal force and friction derivation from aligned bead positions.
//!
//! The substrate is modelled as a cantilever: the bead displacement relative
//! to the reference marker is corrected for where along the beam the load is
//! applied, giving a deflection and hence a normal force. The pipette bead
//! displacement from its rest position gives the friction force.

use std::fmt;

use log::{info, warn};
use thiserror::Error;

use crate::config::{DeflectionModel, PhysicsConfig, PipetteRest};
use crate::core::loaders::Role;
use crate::core::table::{Table, TableError};
use crate::core::transforms::{column_name, INSTANT, X_DELTA, Y_POSITION};

pub const SUBSTRATE_TIP_POSITION: &str = "Substrate_Tip_Position";
pub const CORRECTED_DEFLECTION: &str = "Corrected_Deflection";
pub const NORMAL_FORCE: &str = "Normal_Force";
pub const PIPETTE_DEFLECTION: &str = "Pipette_Deflection";
pub const FRICTION_FORCE: &str = "Friction_Force";
pub const FRICTION_COEFFICIENT: &str = "Friction_Coefficient";

/// Scale between the flexural rigidity units and the length units.
const RIGIDITY_SCALE: f64 = 1e16;

/// Errors that can occur during the physics derivation.
#[derive(Debug, Error)]
pub enum PhysicsError {
    #[error("Missing physical parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid physical parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("Aligned table is missing column {0}")]
    MissingColumn(String),

    #[error("Cannot determine pipette rest position: {0}")]
    NoPipetteRest(String),

    #[error("Table error: {0}")]
    Table(#[from] TableError),
}

/// Result type for physics operations.
pub type Result<T> = std::result::Result<T, PhysicsError>;

/// Fully resolved physical parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsParams {
    pub initial_x_displacement: f64,
    pub substrate_tip_position: f64,
    pub substrate_length: f64,
    pub substrate_stiffness: f64,
    pub pipette_stiffness: f64,
    pub reverse_sliding_direction: bool,
    pub angle_alpha: Option<f64>,
    pub angle_beta: Option<f64>,
    pub flexural_rigidity: Option<f64>,
    pub deflection_model: DeflectionModel,
    pub pipette_rest: PipetteRest,
    pub degenerate_threshold: f64,
}

impl PhysicsParams {
    /// Resolve parameters from config, failing on any that are still unset.
    pub fn from_config(config: &PhysicsConfig) -> Result<Self> {
        fn require(value: Option<f64>, name: &'static str) -> Result<f64> {
            let value = value.ok_or(PhysicsError::MissingParameter(name))?;
            if value.is_finite() {
                Ok(value)
            } else {
                Err(PhysicsError::InvalidParameter { name, value })
            }
        }

        if let Some(value) = config.flexural_rigidity {
            if !value.is_finite() || value == 0.0 {
                return Err(PhysicsError::InvalidParameter {
                    name: "flexural_rigidity",
                    value,
                });
            }
        }

        Ok(Self {
            initial_x_displacement: require(config.initial_x_displacement, "initial_x_displacement")?,
            substrate_tip_position: require(config.substrate_tip_position, "substrate_tip_position")?,
            substrate_length: require(config.substrate_length, "substrate_length")?,
            substrate_stiffness: require(config.substrate_stiffness, "substrate_stiffness")?,
            pipette_stiffness: require(config.pipette_stiffness, "pipette_stiffness")?,
            reverse_sliding_direction: config.reverse_sliding_direction,
            angle_alpha: config.angle_alpha,
            angle_beta: config.angle_beta,
            flexural_rigidity: config.flexural_rigidity,
            deflection_model: config.deflection_model,
            pipette_rest: config.pipette_rest,
            degenerate_threshold: config.degenerate_threshold.abs(),
        })
    }

    /// Substrate tip position at elapsed time `t` seconds.
    pub fn tip_position_at(&self, t: f64) -> f64 {
        match self.deflection_model {
            DeflectionModel::StationaryTip => self.substrate_tip_position,
            DeflectionModel::RampedTip {
                velocity,
                stationary_s,
            } => self.substrate_tip_position + velocity * (t - stationary_s).max(0.0),
        }
    }
}

/// A row whose friction coefficient is unbounded or undefined.
#[derive(Debug, Clone, PartialEq)]
pub struct DegenerateResultWarning {
    pub row: usize,
    pub instant: f64,
    pub normal_force: f64,
    pub friction_coefficient: f64,
}

impl fmt::Display for DegenerateResultWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {} (t={}): normal force {} gives friction coefficient {}",
            self.row, self.instant, self.normal_force, self.friction_coefficient
        )
    }
}

/// Side information produced alongside the derived table.
#[derive(Debug, Clone, Default)]
pub struct PhysicsReport {
    /// Baseline the pipette deflection was measured against.
    pub pipette_rest: f64,
    /// Rows whose normal force was too close to zero.
    pub degenerate: Vec<DegenerateResultWarning>,
}

impl PhysicsReport {
    pub fn is_clean(&self) -> bool {
        self.degenerate.is_empty()
    }
}

fn required<'a>(table: &'a Table, name: &str) -> Result<&'a [f64]> {
    table
        .column(name)
        .ok_or_else(|| PhysicsError::MissingColumn(name.to_string()))
}

/// Work out the pipette baseline from the configured strategy.
pub fn pipette_rest_position(
    rest: PipetteRest,
    instants: &[f64],
    pipette_y: &[f64],
) -> Result<f64> {
    match rest {
        PipetteRest::Fixed { value } => Ok(value),
        PipetteRest::FirstSample => pipette_y
            .iter()
            .copied()
            .find(|y| y.is_finite())
            .ok_or_else(|| PhysicsError::NoPipetteRest("no pipette samples".to_string())),
        PipetteRest::OpeningMeanHeuristic { window_s } => {
            warn!(
                "Estimating pipette rest position from the mean of the first {}s; \
                 this heuristic has no statistical justification",
                window_s
            );
            let start = instants.first().copied().unwrap_or(0.0);
            let window: Vec<f64> = instants
                .iter()
                .zip(pipette_y)
                .filter(|(t, y)| **t - start < window_s && y.is_finite())
                .map(|(_, y)| *y)
                .collect();

            if window.is_empty() {
                return Err(PhysicsError::NoPipetteRest(format!(
                    "no pipette samples in the first {}s",
                    window_s
                )));
            }
            Ok(window.iter().sum::<f64>() / window.len() as f64)
        }
    }
}

/// Derive normal force, friction force and friction coefficient per row.
///
/// Expects the table produced by
/// [`merge_and_resample`](crate::core::transforms::merge_and_resample):
/// indexed by `Instant`, with `X_Delta` and `Pipette_Y_Position`. Appends
/// `Substrate_Tip_Position`, `Corrected_Deflection`, `Normal_Force`,
/// `Pipette_Deflection`, `Friction_Force` and `Friction_Coefficient`.
///
/// Rows where the normal force is within `degenerate_threshold` of zero are
/// reported in [`PhysicsReport::degenerate`]; their coefficients are left as
/// the division produced them.
pub fn derive_measurements(table: &Table, params: &PhysicsParams) -> Result<(Table, PhysicsReport)> {
    if matches!(params.deflection_model, DeflectionModel::RampedTip { .. })
        && table.index_name() != INSTANT
    {
        return Err(PhysicsError::MissingColumn(INSTANT.to_string()));
    }

    let instants = table.index();
    let x_delta = required(table, X_DELTA)?;
    let pipette_y = required(table, &column_name(Role::Pipette, Y_POSITION))?;

    let cos_beta = params.angle_beta.map_or(1.0, f64::cos);
    let holder = params
        .angle_alpha
        .filter(|alpha| *alpha > 0.0)
        .map_or(1.0, f64::cos);
    let length = params.substrate_length;
    let k_substrate = params.substrate_stiffness;

    let tip: Vec<f64> = instants.iter().map(|&t| params.tip_position_at(t)).collect();

    let corrected: Vec<f64> = x_delta
        .iter()
        .zip(pipette_y)
        .zip(&tip)
        .map(|((&dx, &y), &tip_at)| {
            let dx = match params.deflection_model {
                DeflectionModel::StationaryTip => dx,
                DeflectionModel::RampedTip { .. } => dx / cos_beta,
            };
            let displaced = dx + params.initial_x_displacement;

            match params.flexural_rigidity {
                Some(rigidity) => {
                    let from_tip = length - (y - tip_at);
                    displaced * k_substrate * from_tip * from_tip * (3.0 * length - from_tip)
                        / (6.0 * rigidity * RIGIDITY_SCALE)
                }
                None => displaced,
            }
        })
        .collect();

    let normal: Vec<f64> = corrected.iter().map(|d| d * k_substrate).collect();

    let rest = pipette_rest_position(params.pipette_rest, instants, pipette_y)?;
    info!("Pipette rest position: {}", rest);

    let pipette_deflection: Vec<f64> = pipette_y
        .iter()
        .map(|&y| {
            if params.reverse_sliding_direction {
                y * holder - rest
            } else {
                rest - y * holder
            }
        })
        .collect();

    let friction: Vec<f64> = pipette_deflection
        .iter()
        .map(|d| d / cos_beta * params.pipette_stiffness)
        .collect();

    let coefficient: Vec<f64> = friction.iter().zip(&normal).map(|(f, n)| f / n).collect();

    let mut degenerate = Vec::new();
    for (row, (&n, &f)) in normal.iter().zip(&friction).enumerate() {
        if n.is_nan() || f.is_nan() {
            continue;
        }
        if n.abs() <= params.degenerate_threshold || !coefficient[row].is_finite() {
            degenerate.push(DegenerateResultWarning {
                row,
                instant: instants[row],
                normal_force: n,
                friction_coefficient: coefficient[row],
            });
        }
    }

    if let Some(first) = degenerate.first() {
        warn!(
            "Friction coefficient is unbounded in {} of {} rows, first at {}",
            degenerate.len(),
            table.len(),
            first
        );
    }

    let mut derived = table.clone();
    derived.set_column(SUBSTRATE_TIP_POSITION, tip)?;
    derived.set_column(CORRECTED_DEFLECTION, corrected)?;
    derived.set_column(NORMAL_FORCE, normal)?;
    derived.set_column(PIPETTE_DEFLECTION, pipette_deflection)?;
    derived.set_column(FRICTION_FORCE, friction)?;
    derived.set_column(FRICTION_COEFFICIENT, coefficient)?;

    Ok((
        derived,
        PhysicsReport {
            pipette_rest: rest,
            degenerate,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aligned(instants: &[f64], x_delta: &[f64], pipette_y: &[f64]) -> Table {
        let mut table = Table::new(INSTANT, instants.to_vec());
        table.push_column(X_DELTA, x_delta.to_vec()).unwrap();
        table
            .push_column("Pipette_Y_Position", pipette_y.to_vec())
            .unwrap();
        table
    }

    fn params() -> PhysicsParams {
        PhysicsParams {
            initial_x_displacement: 1.0,
            substrate_tip_position: 0.0,
            substrate_length: 10.0,
            substrate_stiffness: 2.0,
            pipette_stiffness: 3.0,
            reverse_sliding_direction: false,
            angle_alpha: None,
            angle_beta: None,
            flexural_rigidity: None,
            deflection_model: DeflectionModel::StationaryTip,
            pipette_rest: PipetteRest::FirstSample,
            degenerate_threshold: 1e-12,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * b.abs().max(1.0)
    }

    #[test]
    fn test_from_config_requires_parameters() {
        let config = PhysicsConfig {
            initial_x_displacement: Some(0.0),
            substrate_tip_position: Some(0.0),
            substrate_length: Some(10.0),
            substrate_stiffness: None,
            pipette_stiffness: Some(1.0),
            ..PhysicsConfig::default()
        };
        assert!(matches!(
            PhysicsParams::from_config(&config),
            Err(PhysicsError::MissingParameter("substrate_stiffness"))
        ));

        let config = PhysicsConfig {
            substrate_stiffness: Some(2.0),
            flexural_rigidity: Some(0.0),
            ..config
        };
        assert!(matches!(
            PhysicsParams::from_config(&config),
            Err(PhysicsError::InvalidParameter { name: "flexural_rigidity", .. })
        ));
    }

    #[test]
    fn test_uncorrected_forces() {
        let table = aligned(&[0.0, 1.0, 2.0], &[0.0, 1.0, 2.0], &[10.0, 9.0, 8.0]);
        let (derived, report) = derive_measurements(&table, &params()).unwrap();

        assert_eq!(derived.column(CORRECTED_DEFLECTION), Some(&[1.0, 2.0, 3.0][..]));
        assert_eq!(derived.column(NORMAL_FORCE), Some(&[2.0, 4.0, 6.0][..]));
        assert_eq!(derived.column(PIPETTE_DEFLECTION), Some(&[0.0, 1.0, 2.0][..]));
        assert_eq!(derived.column(FRICTION_FORCE), Some(&[0.0, 3.0, 6.0][..]));
        assert_eq!(derived.column(FRICTION_COEFFICIENT), Some(&[0.0, 0.75, 1.0][..]));
        assert_eq!(report.pipette_rest, 10.0);
        assert!(report.is_clean());
    }

    #[test]
    fn test_beam_correction() {
        let table = aligned(&[0.0], &[0.0], &[2.0]);
        let mut p = params();
        p.flexural_rigidity = Some(1e-16);

        let (derived, _) = derive_measurements(&table, &p).unwrap();

        // a = L - (y - tip) = 8
        let expected = 1.0 * 2.0 * 8.0 * 8.0 * (30.0 - 8.0) / (6.0 * 1e-16 * 1e16);
        let deflection = derived.column(CORRECTED_DEFLECTION).unwrap()[0];
        assert!(close(deflection, expected), "{} vs {}", deflection, expected);
        assert!(close(derived.column(NORMAL_FORCE).unwrap()[0], expected * 2.0));
    }

    #[test]
    fn test_ramped_tip_position() {
        let table = aligned(&[0.0, 5.0, 10.0], &[0.0, 0.0, 0.0], &[1.0, 1.0, 1.0]);
        let mut p = params();
        p.substrate_tip_position = 1.0;
        p.deflection_model = DeflectionModel::RampedTip {
            velocity: 2.0,
            stationary_s: 5.0,
        };

        let (derived, _) = derive_measurements(&table, &p).unwrap();
        assert_eq!(derived.column(SUBSTRATE_TIP_POSITION), Some(&[1.0, 1.0, 11.0][..]));
    }

    #[test]
    fn test_ramped_tip_applies_beta_to_delta() {
        let table = aligned(&[0.0], &[2.0], &[0.0]);
        let beta = std::f64::consts::FRAC_PI_3;

        let mut stationary = params();
        stationary.angle_beta = Some(beta);
        let (derived, _) = derive_measurements(&table, &stationary).unwrap();
        assert_eq!(derived.column(CORRECTED_DEFLECTION).unwrap()[0], 3.0);

        let mut ramped = stationary.clone();
        ramped.deflection_model = DeflectionModel::RampedTip {
            velocity: 0.0,
            stationary_s: 0.0,
        };
        let (derived, _) = derive_measurements(&table, &ramped).unwrap();
        let expected = 2.0 / beta.cos() + 1.0;
        assert!(close(derived.column(CORRECTED_DEFLECTION).unwrap()[0], expected));
    }

    #[test]
    fn test_reverse_direction_and_alpha() {
        let table = aligned(&[0.0, 1.0], &[1.0, 1.0], &[4.0, 6.0]);
        let mut p = params();
        p.reverse_sliding_direction = true;
        p.angle_alpha = Some(std::f64::consts::FRAC_PI_3);

        let (derived, _) = derive_measurements(&table, &p).unwrap();
        let deflection = derived.column(PIPETTE_DEFLECTION).unwrap();

        let h = std::f64::consts::FRAC_PI_3.cos();
        assert!(close(deflection[0], 4.0 * h - 4.0));
        assert!(close(deflection[1], 6.0 * h - 4.0));
    }

    #[test]
    fn test_fixed_rest_position() {
        let table = aligned(&[0.0, 1.0], &[1.0, 1.0], &[4.0, 6.0]);
        let mut p = params();
        p.pipette_rest = PipetteRest::Fixed { value: 5.0 };

        let (derived, report) = derive_measurements(&table, &p).unwrap();
        assert_eq!(report.pipette_rest, 5.0);
        assert_eq!(derived.column(PIPETTE_DEFLECTION), Some(&[1.0, -1.0][..]));
    }

    #[test]
    fn test_opening_mean_heuristic() {
        let instants = [0.0, 1.0, 2.0, 3.0, 4.0];
        let y = [1.0, 2.0, f64::NAN, 10.0, 10.0];
        let rest = pipette_rest_position(
            PipetteRest::OpeningMeanHeuristic { window_s: 3.0 },
            &instants,
            &y,
        )
        .unwrap();
        assert_eq!(rest, 1.5);
    }

    #[test]
    fn test_first_sample_skips_missing() {
        let rest =
            pipette_rest_position(PipetteRest::FirstSample, &[0.0, 1.0], &[f64::NAN, 7.0]).unwrap();
        assert_eq!(rest, 7.0);

        let missing = pipette_rest_position(PipetteRest::FirstSample, &[0.0], &[f64::NAN]);
        assert!(matches!(missing, Err(PhysicsError::NoPipetteRest(_))));
    }

    #[test]
    fn test_zero_normal_force_is_reported() {
        // Normal force is zero on the first row
        let table = aligned(&[0.0, 1.0], &[-1.0, 0.0], &[4.0, 3.0]);
        let mut p = params();
        p.pipette_rest = PipetteRest::Fixed { value: 5.0 };

        let (derived, report) = derive_measurements(&table, &p).unwrap();

        assert_eq!(derived.column(NORMAL_FORCE).unwrap()[0], 0.0);
        assert!(derived.column(FRICTION_COEFFICIENT).unwrap()[0].is_infinite());
        assert_eq!(report.degenerate.len(), 1);
        assert_eq!(report.degenerate[0].row, 0);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_zero_over_zero_is_reported() {
        let table = aligned(&[0.0, 1.0], &[-1.0, 0.0], &[4.0, 3.0]);
        let (derived, report) = derive_measurements(&table, &params()).unwrap();

        assert!(derived.column(FRICTION_COEFFICIENT).unwrap()[0].is_nan());
        assert_eq!(report.degenerate.len(), 1);
    }

    #[test]
    fn test_missing_column() {
        let mut table = Table::new(INSTANT, vec![0.0]);
        table.push_column(X_DELTA, vec![0.0]).unwrap();
        assert!(matches!(
            derive_measurements(&table, &params()),
            Err(PhysicsError::MissingColumn(_))
        ));
    }
}
