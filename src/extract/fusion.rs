//! Field-by-field merge of probabilistic and deterministic extractions.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::entities::EntityBag;
use crate::extract::rules::dedupe_case_insensitive;
use crate::extract::types::ExtractionResult;

const TITLE_WEIGHT: f32 = 0.4;
const DATE_WEIGHT: f32 = 0.3;
const TIME_WEIGHT: f32 = 0.2;
const LOCATION_WEIGHT: f32 = 0.1;

/// Which extractor a fused field came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Probabilistic,
    Deterministic,
    Both,
}

/// Fused entities plus per-field provenance.
#[derive(Debug, Clone, Default)]
pub struct Fusion {
    /// Participants are in `provisional_participants`; `participants` is
    /// left empty for participant resolution to fill.
    pub entities: EntityBag,
    pub sources: BTreeMap<&'static str, Source>,
}

/// Merge two extractions.
///
/// - title, date, time, date text, location, notes, priority: probabilistic
///   when present and non-empty, else deterministic
/// - participants: case-insensitive union, probabilistic first
/// - duration: deterministic when present
/// - recurrence: probabilistic only
///
/// Confidence is 0.4·title + 0.3·date + 0.2·time + 0.1·location, each
/// term the winning source's confidence for that field.
pub fn fuse_entities(prob: Option<&ExtractionResult>, det: &ExtractionResult) -> Fusion {
    let empty = ExtractionResult::default();
    let prob = prob.unwrap_or(&empty);
    let mut sources = BTreeMap::new();

    let (title, title_conf) = prefer_first(
        "title",
        (text(&prob.title), prob.confidence.title, Source::Probabilistic),
        (text(&det.title), det.confidence.title, Source::Deterministic),
        &mut sources,
    );
    let (date, date_conf) = prefer_first(
        "date",
        (prob.date, prob.confidence.date, Source::Probabilistic),
        (det.date, det.confidence.date, Source::Deterministic),
        &mut sources,
    );
    let (time, time_conf) = prefer_first(
        "time",
        (prob.time, prob.confidence.time, Source::Probabilistic),
        (det.time, det.confidence.time, Source::Deterministic),
        &mut sources,
    );
    let (date_text, _) = prefer_first(
        "date_text",
        (text(&prob.date_text), 0.0, Source::Probabilistic),
        (text(&det.date_text), 0.0, Source::Deterministic),
        &mut sources,
    );
    let (location, location_conf) = prefer_first(
        "location",
        (text(&prob.location), prob.confidence.location, Source::Probabilistic),
        (text(&det.location), det.confidence.location, Source::Deterministic),
        &mut sources,
    );
    let (notes, _) = prefer_first(
        "notes",
        (text(&prob.notes), 0.0, Source::Probabilistic),
        (text(&det.notes), 0.0, Source::Deterministic),
        &mut sources,
    );
    let (priority, _) = prefer_first(
        "priority",
        (prob.priority, 0.0, Source::Probabilistic),
        (det.priority, 0.0, Source::Deterministic),
        &mut sources,
    );
    let (duration_minutes, _) = prefer_first(
        "duration",
        (det.duration_minutes, 0.0, Source::Deterministic),
        (prob.duration_minutes, 0.0, Source::Probabilistic),
        &mut sources,
    );

    let recurrence = prob.recurrence.clone();
    if recurrence.is_some() {
        sources.insert("recurrence", Source::Probabilistic);
    }

    let participants = dedupe_case_insensitive(
        prob.participants
            .iter()
            .chain(det.participants.iter())
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
    );
    match (prob.participants.is_empty(), det.participants.is_empty()) {
        (false, false) => {
            sources.insert("participants", Source::Both);
        }
        (false, true) => {
            sources.insert("participants", Source::Probabilistic);
        }
        (true, false) => {
            sources.insert("participants", Source::Deterministic);
        }
        (true, true) => {}
    }

    let confidence = TITLE_WEIGHT * title_conf
        + DATE_WEIGHT * date_conf
        + TIME_WEIGHT * time_conf
        + LOCATION_WEIGHT * location_conf;

    Fusion {
        entities: EntityBag {
            title,
            date,
            time,
            date_text,
            location,
            participants: Vec::new(),
            provisional_participants: participants,
            duration_minutes,
            recurrence,
            priority,
            notes,
            confidence: confidence.clamp(0.0, 1.0),
            defaults_applied: Vec::new(),
        },
        sources,
    }
}

fn text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// First present candidate wins; its confidence comes along.
fn prefer_first<T>(
    field: &'static str,
    first: (Option<T>, f32, Source),
    second: (Option<T>, f32, Source),
    sources: &mut BTreeMap<&'static str, Source>,
) -> (Option<T>, f32) {
    for (value, confidence, source) in [first, second] {
        if value.is_some() {
            sources.insert(field, source);
            return (value, confidence);
        }
    }
    (None, 0.0)
}
