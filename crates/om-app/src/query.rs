//! Query helpers for extracting data from loaded runs.

use om_results::{EnvelopeReport, RunReport, TrackReport, TwissReport};

use crate::error::{AppError, AppResult};

/// Summary of a run's extent and headline numbers.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub kind: &'static str,
    pub record_count: usize,
    pub s_range: (f64, f64),
    /// Human-readable key figures, in display order
    pub figures: Vec<(String, String)>,
}

/// Get run summary from a report.
pub fn get_run_summary(report: &RunReport) -> AppResult<RunSummary> {
    match report {
        RunReport::Twiss(r) => twiss_summary(r),
        RunReport::Envelope(r) => envelope_summary(r),
        RunReport::Track(r) => Ok(track_summary(r)),
    }
}

fn s_range(first: Option<f64>, last: Option<f64>) -> (f64, f64) {
    (first.unwrap_or(0.0), last.unwrap_or(0.0))
}

fn twiss_summary(r: &TwissReport) -> AppResult<RunSummary> {
    if r.records.is_empty() {
        return Err(AppError::InvalidInput("No records in run".to_string()));
    }
    let max_bx = r.records.iter().map(|t| t.beta_x_m).fold(0.0, f64::max);
    let max_by = r.records.iter().map(|t| t.beta_y_m).fold(0.0, f64::max);
    let max_dx = r
        .records
        .iter()
        .map(|t| t.disp_x_m.abs())
        .fold(0.0, f64::max);

    let mut figures = Vec::new();
    if let (Some(qx), Some(qy)) = (r.qx, r.qy) {
        figures.push(("Qx".to_string(), format!("{qx:.6}")));
        figures.push(("Qy".to_string(), format!("{qy:.6}")));
    }
    if let Some(qs) = r.qs {
        figures.push(("Qs".to_string(), format!("{qs:.6}")));
    }
    if let (Some(xi_x), Some(xi_y)) = (r.xi_x, r.xi_y) {
        figures.push(("xi_x".to_string(), format!("{xi_x:.4}")));
        figures.push(("xi_y".to_string(), format!("{xi_y:.4}")));
    }
    figures.push(("max beta_x [m]".to_string(), format!("{max_bx:.4}")));
    figures.push(("max beta_y [m]".to_string(), format!("{max_by:.4}")));
    figures.push(("max |D_x| [m]".to_string(), format!("{max_dx:.4}")));
    if r.coupled {
        figures.push(("coupled".to_string(), "yes".to_string()));
    }

    Ok(RunSummary {
        kind: "twiss",
        record_count: r.records.len(),
        s_range: s_range(
            r.records.first().map(|t| t.s_m),
            r.records.last().map(|t| t.s_m),
        ),
        figures,
    })
}

fn envelope_summary(r: &EnvelopeReport) -> AppResult<RunSummary> {
    if r.records.is_empty() {
        return Err(AppError::InvalidInput("No records in run".to_string()));
    }
    let max_sx = r.records.iter().map(|e| e.sigma_x_m).fold(0.0, f64::max);
    let max_sy = r.records.iter().map(|e| e.sigma_y_m).fold(0.0, f64::max);

    let mut figures = vec![
        ("max sigma_x [mm]".to_string(), format!("{:.4}", max_sx * 1e3)),
        ("max sigma_y [mm]".to_string(), format!("{:.4}", max_sy * 1e3)),
    ];
    if r.space_charge {
        figures.push(("space-charge iterations".to_string(), r.iterations.to_string()));
        figures.push(("residual".to_string(), format!("{:.3e}", r.residual)));
    }

    Ok(RunSummary {
        kind: "envelope",
        record_count: r.records.len(),
        s_range: s_range(
            r.records.first().map(|e| e.s_m),
            r.records.last().map(|e| e.s_m),
        ),
        figures,
    })
}

fn track_summary(r: &TrackReport) -> RunSummary {
    RunSummary {
        kind: "track",
        record_count: r.particles.len(),
        s_range: (0.0, 0.0),
        figures: vec![
            ("turns".to_string(), r.turns.to_string()),
            ("particles".to_string(), r.particles.len().to_string()),
            ("alive".to_string(), r.alive_count().to_string()),
        ],
    }
}

/// Extract `(s, value)` pairs for a lattice function.
pub fn extract_twiss_series(report: &TwissReport, variable: &str) -> AppResult<Vec<(f64, f64)>> {
    let pick: fn(&om_results::TwissRecord) -> f64 = match variable {
        "beta_x" => |t| t.beta_x_m,
        "beta_y" => |t| t.beta_y_m,
        "alpha_x" => |t| t.alpha_x,
        "alpha_y" => |t| t.alpha_y,
        "disp_x" => |t| t.disp_x_m,
        "disp_y" => |t| t.disp_y_m,
        "mu_x" => |t| t.mu_x,
        "mu_y" => |t| t.mu_y,
        "orbit_x" => |t| t.orbit[0],
        "orbit_y" => |t| t.orbit[2],
        _ => {
            return Err(AppError::InvalidInput(format!(
                "Unknown twiss variable: {variable}"
            )));
        }
    };
    Ok(report.records.iter().map(|t| (t.s_m, pick(t))).collect())
}

/// Extract `(s, value)` pairs for a beam size or emittance.
pub fn extract_envelope_series(
    report: &EnvelopeReport,
    variable: &str,
) -> AppResult<Vec<(f64, f64)>> {
    let pick: fn(&om_results::EnvelopeRecord) -> f64 = match variable {
        "sigma_x" => |e| e.sigma_x_m,
        "sigma_y" => |e| e.sigma_y_m,
        "sigma_z" => |e| e.sigma_z_m,
        "emittance_x" => |e| e.emittance_x_m,
        "emittance_y" => |e| e.emittance_y_m,
        "emittance_z" => |e| e.emittance_z_m,
        _ => {
            return Err(AppError::InvalidInput(format!(
                "Unknown envelope variable: {variable}"
            )));
        }
    };
    Ok(report.records.iter().map(|e| (e.s_m, pick(e))).collect())
}

/// Recorded `(turn, coordinate)` pairs of one particle; `coordinate`
/// indexes (x, x', y, y', z, δ).
pub fn particle_series(
    report: &TrackReport,
    particle: usize,
    coordinate: usize,
) -> AppResult<Vec<(usize, f64)>> {
    if coordinate >= 6 {
        return Err(AppError::InvalidInput(format!(
            "Coordinate index out of range: {coordinate}"
        )));
    }
    let record = report.particles.get(particle).ok_or_else(|| {
        AppError::InvalidInput(format!("No particle with index {particle}"))
    })?;
    Ok(record
        .history
        .iter()
        .map(|h| (h.turn, h.coords[coordinate]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use om_results::{HistoryPoint, ParticleRecord, TwissRecord};

    fn record(s: f64, beta_x: f64) -> TwissRecord {
        TwissRecord {
            element: "q".to_string(),
            s_m: s,
            beta_x_m: beta_x,
            alpha_x: 0.0,
            beta_y_m: 2.0,
            alpha_y: 0.0,
            disp_x_m: -0.5,
            disp_px: 0.0,
            disp_y_m: 0.0,
            disp_py: 0.0,
            mu_x: 0.0,
            mu_y: 0.0,
            orbit: [0.0; 6],
        }
    }

    fn twiss_report() -> TwissReport {
        TwissReport {
            qx: Some(1.25),
            qy: Some(1.3),
            qs: None,
            xi_x: None,
            xi_y: None,
            coupled: false,
            iterations: 0,
            residual: 0.0,
            records: vec![record(0.0, 3.0), record(1.0, 7.0), record(2.0, 3.0)],
        }
    }

    #[test]
    fn twiss_summary_reports_tunes_and_extrema() {
        let summary = get_run_summary(&RunReport::Twiss(twiss_report())).unwrap();
        assert_eq!(summary.kind, "twiss");
        assert_eq!(summary.record_count, 3);
        assert_eq!(summary.s_range, (0.0, 2.0));
        let find = |k: &str| {
            summary
                .figures
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(find("Qx").as_deref(), Some("1.250000"));
        assert_eq!(find("max beta_x [m]").as_deref(), Some("7.0000"));
        assert_eq!(find("max |D_x| [m]").as_deref(), Some("0.5000"));
        assert!(find("Qs").is_none());
    }

    #[test]
    fn empty_twiss_report_is_rejected() {
        let mut report = twiss_report();
        report.records.clear();
        assert!(get_run_summary(&RunReport::Twiss(report)).is_err());
    }

    #[test]
    fn series_extraction_by_name() {
        let series = extract_twiss_series(&twiss_report(), "beta_x").unwrap();
        assert_eq!(series, vec![(0.0, 3.0), (1.0, 7.0), (2.0, 3.0)]);
        assert!(extract_twiss_series(&twiss_report(), "pressure").is_err());
    }

    #[test]
    fn particle_series_reads_history() {
        let report = TrackReport {
            turns: 2,
            fast: false,
            particles: vec![ParticleRecord {
                index: 0,
                coords: [3.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                turn: 2,
                alive: true,
                lost_element: None,
                lost_element_index: None,
                lost_turn: None,
                loss_reason: None,
                history: (0..3)
                    .map(|turn| HistoryPoint {
                        turn,
                        coords: [turn as f64, 0.0, 0.0, 0.0, 0.0, 0.0],
                    })
                    .collect(),
            }],
        };
        assert_eq!(
            particle_series(&report, 0, 0).unwrap(),
            vec![(0, 0.0), (1, 1.0), (2, 2.0)]
        );
        assert!(particle_series(&report, 1, 0).is_err());
        assert!(particle_series(&report, 0, 6).is_err());
    }
}
