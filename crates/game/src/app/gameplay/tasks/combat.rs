use crate::app::config::UnitStats;

/// Weapon timing for one attacker. The attack task decides when the target
/// is in range; the spell decides when the next blow lands.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AttackSpell {
    damage: f32,
    range: f32,
    cooldown: f32,
    since_last: f32,
}

impl AttackSpell {
    pub(crate) fn new(stats: &UnitStats, weapons_bonus: f32) -> Self {
        let cooldown = stats.attack_cooldown_seconds.max(0.0);
        Self {
            damage: stats.attack + weapons_bonus,
            range: stats.attack_range,
            cooldown,
            // Ready to strike on first contact.
            since_last: cooldown,
        }
    }

    pub(crate) fn range(&self) -> f32 {
        self.range
    }

    pub(crate) fn tick(&mut self, dt: f32) {
        self.since_last = (self.since_last + dt.max(0.0)).min(self.cooldown.max(dt));
    }

    /// Raw damage of the blow when the weapon is ready.
    pub(crate) fn try_fire(&mut self) -> Option<f32> {
        if self.since_last + f32::EPSILON < self.cooldown {
            return None;
        }
        self.since_last = 0.0;
        Some(self.damage)
    }
}

/// Damage left after `defense`, never below `min_damage`.
pub(crate) fn mitigated_damage(raw: f32, defense: f32, min_damage: f32) -> f32 {
    (raw - defense).max(min_damage)
}
