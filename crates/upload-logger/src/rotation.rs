// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Decides when the active segment has to be rotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotateCoordinator {
    pub max_lines: usize,
    pub max_age: Duration,
}

impl RotateCoordinator {
    pub fn new(max_lines: usize, max_age: Duration) -> Self {
        RotateCoordinator { max_lines, max_age }
    }

    /// Checked after every appended line.
    pub fn lines_exceeded(&self, lines: usize) -> bool {
        lines >= self.max_lines
    }

    /// Checked by the rotation ticker. Empty segments are never rotated.
    pub fn age_exceeded(&self, lines: usize, age: Duration) -> bool {
        lines > 0 && age >= self.max_age
    }

    /// How often the ticker looks at the active segment.
    pub fn tick_interval(&self) -> Duration {
        let quarter = self.max_age / 4;
        quarter.clamp(Duration::from_millis(10), Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_exceeded() {
        let rotate = RotateCoordinator::new(3, Duration::from_secs(60));
        assert!(!rotate.lines_exceeded(2));
        assert!(rotate.lines_exceeded(3));
        assert!(rotate.lines_exceeded(4));
    }

    #[test]
    fn test_age_exceeded_ignores_empty_segments() {
        let rotate = RotateCoordinator::new(3, Duration::from_secs(1));
        assert!(!rotate.age_exceeded(0, Duration::from_secs(10)));
        assert!(!rotate.age_exceeded(1, Duration::from_millis(500)));
        assert!(rotate.age_exceeded(1, Duration::from_secs(1)));
    }

    #[test]
    fn test_tick_interval_bounds() {
        let short = RotateCoordinator::new(1, Duration::from_millis(20));
        assert_eq!(short.tick_interval(), Duration::from_millis(10));

        let long = RotateCoordinator::new(1, Duration::from_secs(60));
        assert_eq!(long.tick_interval(), Duration::from_secs(1));
    }
}
