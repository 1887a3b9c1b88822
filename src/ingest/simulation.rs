use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::db::{Desk, Sample};
use crate::settings::SimulationSettings;

/// Produces synthetic readings for desks that have no sensor of their own.
pub trait SampleSimulator: Send + Sync {
    fn simulate(&self, desks: &[&Desk], timestamp: DateTime<Utc>) -> Vec<Sample>;
}

/// Uniformly random whole-number readings in `[min, max]`. A range with no
/// whole number inside always yields `min`.
pub struct RandomFill {
    min: f64,
    whole: Option<(i64, i64)>,
    rng: Mutex<StdRng>,
}

impl RandomFill {
    pub fn new(min: f64, max: f64) -> Self {
        Self::with_rng(min, max, StdRng::from_entropy())
    }

    pub fn seeded(min: f64, max: f64, seed: u64) -> Self {
        Self::with_rng(min, max, StdRng::seed_from_u64(seed))
    }

    pub fn from_settings(settings: &SimulationSettings) -> Self {
        Self::new(settings.value_min, settings.value_max)
    }

    fn with_rng(min: f64, max: f64, rng: StdRng) -> Self {
        let (min, max) = (min.min(max), max.max(min));
        let (low, high) = (min.ceil(), max.floor());
        Self {
            min,
            whole: (low <= high).then_some((low as i64, high as i64)),
            rng: Mutex::new(rng),
        }
    }
}

impl SampleSimulator for RandomFill {
    fn simulate(&self, desks: &[&Desk], timestamp: DateTime<Utc>) -> Vec<Sample> {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        desks
            .iter()
            .map(|desk| {
                let value = match self.whole {
                    Some((low, high)) => rng.gen_range(low..=high) as f64,
                    None => self.min,
                };
                Sample::new(timestamp, desk.desk_id.clone(), desk.zone_id.clone(), Some(value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_whole_numbers_within_range() {
        let fill = RandomFill::seeded(200.0, 850.0, 7);
        let desks: Vec<Desk> = (0..50).map(|idx| Desk::new("zone1", format!("d{idx}"))).collect();
        let refs: Vec<&Desk> = desks.iter().collect();
        let now = Utc::now();

        let samples = fill.simulate(&refs, now);

        assert_eq!(samples.len(), 50);
        for (sample, desk) in samples.iter().zip(&desks) {
            let value = sample.value.unwrap();
            assert!((200.0..=850.0).contains(&value), "{value}");
            assert_eq!(value.fract(), 0.0);
            assert_eq!(sample.timestamp, now);
            assert_eq!(sample.desk_id, desk.desk_id);
        }
    }

    #[test]
    fn degenerate_range_yields_the_single_value() {
        let fill = RandomFill::seeded(300.0, 300.0, 1);
        let desk = Desk::new("zone1", "d1");
        let samples = fill.simulate(&[&desk], Utc::now());
        assert_eq!(samples[0].value, Some(300.0));
    }

    #[test]
    fn fractional_bounds_stay_inside_the_range() {
        let desks: Vec<Desk> = (0..20).map(|idx| Desk::new("zone1", format!("d{idx}"))).collect();
        let refs: Vec<&Desk> = desks.iter().collect();

        let narrow = RandomFill::seeded(200.5, 201.7, 3).simulate(&refs, Utc::now());
        assert!(narrow.iter().all(|sample| sample.value == Some(201.0)));

        let no_whole = RandomFill::seeded(200.5, 200.7, 3).simulate(&refs, Utc::now());
        assert!(no_whole.iter().all(|sample| sample.value == Some(200.5)));
    }
}
