use std::collections::HashMap;

use bevy_ecs::prelude::*;

use crate::simulation::economy::Money;
use crate::simulation::track::OwnerId;

/// How much an owner cares about a category of behaviour. 1.0 is neutral.
pub trait ValueWeights {
    fn weight(&self, owner: OwnerId, category: &str) -> f64;
}

/// Queries and side effects the escalation ladder needs from the rest of the game.
pub trait InvestigationContext {
    /// Share of the owner's wealth that is explained by legitimate income, in [0, 1].
    fn legitimacy(&self, owner: OwnerId) -> f64;
    fn has_evidence(&self, owner: OwnerId) -> bool;
    /// Freezes `fraction` of the owner's liquid funds and returns the amount frozen.
    fn freeze_funds(&mut self, owner: OwnerId, fraction: f64) -> Money;
    fn release_funds(&mut self, owner: OwnerId, amount: Money);
    fn seize_funds(&mut self, owner: OwnerId, amount: Money);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UniformWeights;

impl ValueWeights for UniformWeights {
    fn weight(&self, _owner: OwnerId, _category: &str) -> f64 {
        1.0
    }
}

/// Per-NPC value weights, e.g. a strict boss weighting "late_for_work" at 2.0.
#[derive(Resource, Debug, Clone, Default)]
pub struct PersonalityWeights {
    weights: HashMap<(OwnerId, String), f64>,
}

impl PersonalityWeights {
    pub fn set(&mut self, owner: OwnerId, category: &str, weight: f64) {
        self.weights
            .insert((owner, category.to_string()), weight.max(0.0));
    }
}

impl ValueWeights for PersonalityWeights {
    fn weight(&self, owner: OwnerId, category: &str) -> f64 {
        self.weights
            .get(&(owner, category.to_string()))
            .copied()
            .unwrap_or(1.0)
    }
}

/// Context with fixed answers and no economy behind it. Funds operations are no-ops.
#[derive(Debug, Clone, Copy)]
pub struct FixedContext {
    pub legitimacy: f64,
    pub evidence: bool,
}

impl Default for FixedContext {
    fn default() -> Self {
        Self {
            legitimacy: 1.0,
            evidence: false,
        }
    }
}

impl InvestigationContext for FixedContext {
    fn legitimacy(&self, _owner: OwnerId) -> f64 {
        self.legitimacy
    }

    fn has_evidence(&self, _owner: OwnerId) -> bool {
        self.evidence
    }

    fn freeze_funds(&mut self, _owner: OwnerId, _fraction: f64) -> Money {
        Money::zero()
    }

    fn release_funds(&mut self, _owner: OwnerId, _amount: Money) {}

    fn seize_funds(&mut self, _owner: OwnerId, _amount: Money) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn personality_weights_default_to_neutral() {
        let mut weights = PersonalityWeights::default();
        weights.set(OwnerId(2), "late_for_work", 2.0);
        weights.set(OwnerId(2), "gossip", -3.0);
        assert_eq!(weights.weight(OwnerId(2), "late_for_work"), 2.0);
        assert_eq!(weights.weight(OwnerId(2), "gossip"), 0.0);
        assert_eq!(weights.weight(OwnerId(3), "late_for_work"), 1.0);
        assert_eq!(UniformWeights.weight(OwnerId(3), "anything"), 1.0);
    }
}
