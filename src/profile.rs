//! Read-only user pattern lookup used to fill defaults.
//!
//! Summaries are frequency tables over what the user created before.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::entities::EntityBag;
use crate::error::ProfileError;

/// How many entries the "frequent" lists keep.
const TOP_N: usize = 3;

/// What we know about a user's habits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPatternSummary {
    pub most_common_time: Option<NaiveTime>,
    pub average_duration_minutes: Option<u32>,
    /// Most frequent first.
    pub frequent_locations: Vec<String>,
    /// Number of items the summary is built from.
    pub samples: u32,
}

/// Source of user pattern summaries.
///
/// `Ok(None)` means "nothing known", which is normal for new users.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn pattern_summary(&self, user_id: &str)
    -> Result<Option<UserPatternSummary>, ProfileError>;
}

#[derive(Debug, Default)]
struct UserHistory {
    times: BTreeMap<NaiveTime, u32>,
    duration_total: u64,
    duration_count: u32,
    locations: HashMap<String, u32>,
    samples: u32,
}

impl UserHistory {
    fn summarize(&self) -> UserPatternSummary {
        // Ties go to the earlier time.
        let most_common_time = self
            .times
            .iter()
            .fold(None::<(NaiveTime, u32)>, |best, (time, count)| match best {
                Some((_, best_count)) if best_count >= *count => best,
                _ => Some((*time, *count)),
            })
            .map(|(time, _)| time);

        let average_duration_minutes = (self.duration_count > 0).then(|| {
            (self.duration_total as f64 / f64::from(self.duration_count)).round() as u32
        });

        UserPatternSummary {
            most_common_time,
            average_duration_minutes,
            frequent_locations: top(&self.locations),
            samples: self.samples,
        }
    }
}

fn top(counts: &HashMap<String, u32>) -> Vec<String> {
    let mut entries: Vec<(&String, &u32)> = counts.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    entries.into_iter().take(TOP_N).map(|(k, _)| k.clone()).collect()
}

/// Process-local profile store built from the entities a user confirmed.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    users: RwLock<HashMap<String, UserHistory>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one created item into the user's history.
    pub async fn record(&self, user_id: &str, entities: &EntityBag) {
        let mut users = self.users.write().await;
        let history = users.entry(user_id.to_string()).or_default();
        history.samples += 1;
        if let Some(time) = entities.time {
            *history.times.entry(time).or_default() += 1;
        }
        if let Some(duration) = entities.duration_minutes {
            history.duration_total += u64::from(duration);
            history.duration_count += 1;
        }
        if let Some(location) = &entities.location {
            *history.locations.entry(location.clone()).or_default() += 1;
        }
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn pattern_summary(
        &self,
        user_id: &str,
    ) -> Result<Option<UserPatternSummary>, ProfileError> {
        Ok(self.users.read().await.get(user_id).map(UserHistory::summarize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bag(hour: u32, duration: u32, location: &str) -> EntityBag {
        EntityBag {
            time: NaiveTime::from_hms_opt(hour, 0, 0),
            duration_minutes: Some(duration),
            location: Some(location.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn unknown_user_has_no_summary() {
        let store = InMemoryProfileStore::new();
        assert_eq!(store.pattern_summary("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn summarizes_frequencies() {
        let store = InMemoryProfileStore::new();
        store.record("u", &bag(10, 30, "Office")).await;
        store.record("u", &bag(14, 60, "Cafe")).await;
        store.record("u", &bag(14, 60, "Office")).await;

        let summary = store.pattern_summary("u").await.unwrap().unwrap();
        assert_eq!(summary.most_common_time, NaiveTime::from_hms_opt(14, 0, 0));
        assert_eq!(summary.average_duration_minutes, Some(50));
        assert_eq!(summary.frequent_locations, vec!["Office", "Cafe"]);
        assert_eq!(summary.samples, 3);
    }

    #[tokio::test]
    async fn duration_average_ignores_items_without_one() {
        let store = InMemoryProfileStore::new();
        for _ in 0..1000 {
            store.record("u", &bag(9, 30, "Office")).await;
        }
        store
            .record(
                "u",
                &EntityBag {
                    duration_minutes: Some(90),
                    ..Default::default()
                },
            )
            .await;
        store.record("u", &EntityBag::default()).await;

        let summary = store.pattern_summary("u").await.unwrap().unwrap();
        assert_eq!(summary.average_duration_minutes, Some(30));
        assert_eq!(summary.samples, 1002);
    }

    #[tokio::test]
    async fn time_ties_prefer_earlier() {
        let store = InMemoryProfileStore::new();
        store.record("u", &bag(16, 30, "A")).await;
        store.record("u", &bag(9, 30, "B")).await;
        let summary = store.pattern_summary("u").await.unwrap().unwrap();
        assert_eq!(summary.most_common_time, NaiveTime::from_hms_opt(9, 0, 0));
    }
}
