/// Closed range of ray distances `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub min: f32,
    pub max: f32,
}

impl Interval {
    /// Every non-negative distance.
    pub const FORWARD: Interval = Interval {
        min: 0.0,
        max: f32::INFINITY,
    };

    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// True when no distance lies in the range.
    pub fn is_empty(&self) -> bool {
        self.max < self.min
    }

    /// Inclusive on both ends.
    pub fn contains(&self, t: f32) -> bool {
        self.min <= t && t <= self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_are_inclusive() {
        let range = Interval::new(0.5, 2.0);
        assert!(range.contains(0.5) && range.contains(2.0));
        assert!(!range.contains(0.49) && !range.contains(2.01));
    }

    #[test]
    fn test_forward_and_empty() {
        assert!(Interval::FORWARD.contains(0.0));
        assert!(Interval::FORWARD.contains(1e10));
        assert!(!Interval::FORWARD.contains(-1e-3));
        assert!(Interval::new(1.0, 0.0).is_empty());
        assert!(!Interval::new(1.0, 1.0).is_empty());
    }
}
