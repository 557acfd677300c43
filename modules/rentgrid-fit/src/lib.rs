//! Pure transformation from a quality analysis into a 0-100 fit score and
//! five lifestyle icon states. No I/O, no async: every dimension here is a
//! deterministic function of `AnalysisObservations` plus bedroom count.

use rentgrid_common::{AnalysisObservations, FitResult, IconState, LifestyleIcon};

/// Relative weights, summing to 100. Tunable constants, not spec.
const WEIGHT_KITCHEN: f64 = 15.0;
const WEIGHT_SOUND_CONSTRUCTION: f64 = 12.0;
const WEIGHT_LIGHT_CEILING: f64 = 15.0;
const WEIGHT_WORKSPACE: f64 = 13.0;
const WEIGHT_HOSTING: f64 = 15.0;
const WEIGHT_VIBE: f64 = 12.0;
const WEIGHT_SPACE: f64 = 18.0;

const CONDITION_PENALTY_BASE: f64 = 10.0;

/// Each dimension's weighted partial, or `None` if every input it needs is
/// unknown (contributes neither to numerator nor denominator).
struct Dimension {
    weight: f64,
    partial: Option<f64>,
}

fn kitchen(o: &AnalysisObservations) -> Dimension {
    let mut parts = Vec::new();
    if let Some(hob) = o.hob_type {
        parts.push(match hob {
            rentgrid_common::HobType::Gas | rentgrid_common::HobType::Induction => 1.0,
            rentgrid_common::HobType::Electric => 0.6,
            rentgrid_common::HobType::Unknown => 0.3,
        });
    }
    if let Some(good) = o.kitchen_condition_good {
        parts.push(if good { 1.0 } else { 0.2 });
    }
    if let Some(appliance) = o.has_dishwasher_or_washer {
        parts.push(if appliance { 1.0 } else { 0.4 });
    }
    Dimension {
        weight: WEIGHT_KITCHEN,
        partial: average(&parts),
    }
}

fn sound_construction(o: &AnalysisObservations) -> Dimension {
    let mut parts = Vec::new();
    if let Some(glazed) = o.double_glazing {
        parts.push(if glazed { 1.0 } else { 0.3 });
    }
    if let Some(construction) = o.construction_type {
        parts.push(match construction {
            rentgrid_common::ConstructionType::NewBuild => 1.0,
            rentgrid_common::ConstructionType::Modern => 0.7,
            rentgrid_common::ConstructionType::Period => 0.5,
        });
    }
    if let Some(noisy) = o.noise_indicators {
        parts.push(if noisy { 0.2 } else { 1.0 });
    }
    Dimension {
        weight: WEIGHT_SOUND_CONSTRUCTION,
        partial: average(&parts),
    }
}

fn light_and_ceiling(o: &AnalysisObservations) -> Dimension {
    let mut parts = Vec::new();
    if let Some(grade) = o.natural_light_grade {
        parts.push(grade_to_unit(grade));
    }
    if let Some(grade) = o.ceiling_height_grade {
        parts.push(grade_to_unit(grade));
    }
    if let Some(floor) = o.floor_level {
        // ground floor and very high floors both dock slightly; mid floors score best.
        parts.push(if (1..=4).contains(&floor) { 1.0 } else { 0.7 });
    }
    Dimension {
        weight: WEIGHT_LIGHT_CEILING,
        partial: average(&parts),
    }
}

fn workspace(o: &AnalysisObservations, bedrooms: i32) -> Dimension {
    let partial = if bedrooms >= 2 {
        Some(1.0)
    } else if bedrooms == 1 {
        o.has_desk_space.map(|has_desk| if has_desk { 0.7 } else { 0.3 })
    } else {
        // studio
        o.has_desk_space.map(|has_desk| if has_desk { 0.5 } else { 0.0 })
    };
    Dimension {
        weight: WEIGHT_WORKSPACE,
        partial,
    }
}

fn hosting(o: &AnalysisObservations) -> Dimension {
    let mut parts = Vec::new();
    if let Some(open) = o.open_layout {
        parts.push(if open { 1.0 } else { 0.5 });
    }
    if let Some(spacious) = o.spacious {
        parts.push(if spacious { 1.0 } else { 0.4 });
    }
    if let Some(noisy) = o.noise_indicators {
        parts.push(if noisy { 0.3 } else { 1.0 });
    }
    Dimension {
        weight: WEIGHT_HOSTING,
        partial: average(&parts),
    }
}

fn vibe(o: &AnalysisObservations) -> Dimension {
    let mut parts = Vec::new();
    if let Some(character) = o.character_property {
        parts.push(if character { 1.0 } else { 0.6 });
    }
    if let Some(keywords) = o.highlight_keywords_present {
        parts.push(if keywords { 1.0 } else { 0.5 });
    }
    Dimension {
        weight: WEIGHT_VIBE,
        partial: average(&parts),
    }
}

fn space(o: &AnalysisObservations) -> Dimension {
    let mut parts = Vec::new();
    if let Some(spacious) = o.spacious {
        parts.push(if spacious { 1.0 } else { 0.4 });
    }
    if let Some(outdoor) = o.outdoor_space {
        parts.push(if outdoor { 1.0 } else { 0.5 });
    }
    Dimension {
        weight: WEIGHT_SPACE,
        partial: average(&parts),
    }
}

fn penalty(o: &AnalysisObservations) -> f64 {
    match (o.condition_concerns, o.condition_severity) {
        (Some(true), Some(severity)) => CONDITION_PENALTY_BASE * (severity as f64 / 5.0).min(1.0),
        (Some(true), None) => CONDITION_PENALTY_BASE * 0.5,
        _ => 0.0,
    }
}

fn grade_to_unit(grade: u8) -> f64 {
    (grade.min(5) as f64 / 5.0).clamp(0.0, 1.0)
}

fn average(parts: &[f64]) -> Option<f64> {
    if parts.is_empty() {
        None
    } else {
        Some(parts.iter().sum::<f64>() / parts.len() as f64)
    }
}

/// Compute the 0-100 fit score plus five lifestyle icons. `bedrooms` feeds
/// only the workspace dimension. Returns `score = None` iff every weighted
/// dimension's inputs were entirely unknown.
pub fn compute_fit(observations: &AnalysisObservations, bedrooms: i32) -> FitResult {
    let dims = [
        kitchen(observations),
        sound_construction(observations),
        light_and_ceiling(observations),
        workspace(observations, bedrooms),
        hosting(observations),
        vibe(observations),
        space(observations),
    ];

    let mut weighted_sum = 0.0;
    let mut active_weight_total = 0.0;
    for dim in &dims {
        if let Some(partial) = dim.partial {
            weighted_sum += partial * dim.weight;
            active_weight_total += dim.weight;
        }
    }

    let score = if active_weight_total == 0.0 {
        None
    } else {
        let raw = (weighted_sum / active_weight_total) * 100.0 - penalty(observations);
        Some(raw.round().clamp(0.0, 100.0) as i32)
    };

    FitResult {
        score,
        kitchen: icon(kitchen(observations).partial, "kitchen"),
        light_and_space: icon(
            average(&[light_and_ceiling(observations).partial, space(observations).partial].into_iter().flatten().collect::<Vec<_>>()),
            "light and space",
        ),
        workspace: icon(workspace(observations, bedrooms).partial, "workspace"),
        hosting: icon(hosting(observations).partial, "hosting"),
        vibe: icon(vibe(observations).partial, "vibe"),
    }
}

fn icon(partial: Option<f64>, label: &str) -> LifestyleIcon {
    match partial {
        None => LifestyleIcon {
            state: IconState::Neutral,
            tooltip: format!("Not enough information to judge {label}."),
        },
        Some(p) if p >= 0.7 => LifestyleIcon {
            state: IconState::Good,
            tooltip: format!("Strong {label}."),
        },
        Some(p) if p <= 0.35 => LifestyleIcon {
            state: IconState::Concern,
            tooltip: format!("Possible {label} concern."),
        },
        Some(_) => LifestyleIcon {
            state: IconState::Neutral,
            tooltip: format!("Average {label}."),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentgrid_common::{ConstructionType, HobType};

    #[test]
    fn fully_unknown_input_yields_null_score_and_neutral_icons() {
        let obs = AnalysisObservations::default();
        let result = compute_fit(&obs, 2);
        assert_eq!(result.score, None);
        assert_eq!(result.kitchen.state, IconState::Neutral);
        assert_eq!(result.light_and_space.state, IconState::Neutral);
        assert_eq!(result.workspace.state, IconState::Neutral);
        assert_eq!(result.hosting.state, IconState::Neutral);
        assert_eq!(result.vibe.state, IconState::Neutral);
    }

    #[test]
    fn score_in_range_when_any_dimension_known() {
        let mut obs = AnalysisObservations::default();
        obs.hob_type = Some(HobType::Gas);
        let result = compute_fit(&obs, 2);
        let score = result.score.expect("should be scored");
        assert!((0..=100).contains(&score));
    }

    #[test]
    fn two_bed_gets_full_workspace_credit_regardless_of_desk() {
        let obs = AnalysisObservations::default();
        let result = compute_fit(&obs, 2);
        // workspace dimension alone is unknown-contributing since no other
        // fields set; bedrooms >= 2 makes it Some(1.0) not None.
        assert_eq!(result.workspace.state, IconState::Good);
    }

    #[test]
    fn studio_with_no_desk_gets_concern_workspace() {
        let mut obs = AnalysisObservations::default();
        obs.has_desk_space = Some(false);
        let result = compute_fit(&obs, 0);
        assert_eq!(result.workspace.state, IconState::Concern);
    }

    #[test]
    fn studio_with_desk_gets_neutral_workspace() {
        let mut obs = AnalysisObservations::default();
        obs.has_desk_space = Some(true);
        let result = compute_fit(&obs, 0);
        assert_eq!(result.workspace.state, IconState::Neutral);
    }

    #[test]
    fn condition_concerns_reduce_score() {
        let mut base = AnalysisObservations::default();
        base.hob_type = Some(HobType::Gas);
        base.kitchen_condition_good = Some(true);
        base.double_glazing = Some(true);
        base.construction_type = Some(ConstructionType::Modern);

        let clean = compute_fit(&base, 2).score.unwrap();

        let mut concerning = base.clone();
        concerning.condition_concerns = Some(true);
        concerning.condition_severity = Some(5);
        let penalized = compute_fit(&concerning, 2).score.unwrap();

        assert!(penalized < clean);
    }

    #[test]
    fn score_is_clamped_to_0_100() {
        let mut obs = AnalysisObservations::default();
        obs.condition_concerns = Some(true);
        obs.condition_severity = Some(5);
        obs.hob_type = Some(HobType::Unknown);
        let result = compute_fit(&obs, 2);
        let score = result.score.unwrap();
        assert!((0..=100).contains(&score));
    }
}
