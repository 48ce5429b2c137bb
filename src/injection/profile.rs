
use crate::injection::GateError;

/// One constant-speed stretch of screw travel, ending at `boundary`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stage {
    pub speed: f64,
    pub boundary: f64,
}

/// Three-stage injection speed profile.
///
/// Screw position counts down from `start_position`; stage one runs until
/// the first boundary, stage two until the second, and stage three until the
/// V/P switch (the third boundary).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageProfile {
    pub start_position: f64,
    pub stages: [Stage; 3],
}

impl Default for StageProfile {
    fn default() -> Self {
        Self::new(100.0, (50.0, 70.0), (80.0, 40.0), 60.0, 15.0)
    }
}

impl StageProfile {
    pub fn new(
        start_position: f64,
        (v1, s1): (f64, f64),
        (v2, s2): (f64, f64),
        v3: f64,
        vp_position: f64,
    ) -> Self {
        Self {
            start_position,
            stages: [
                Stage {
                    speed: v1,
                    boundary: s1,
                },
                Stage {
                    speed: v2,
                    boundary: s2,
                },
                Stage {
                    speed: v3,
                    boundary: vp_position,
                },
            ],
        }
    }

    pub fn vp_position(&self) -> f64 {
        self.stages[2].boundary
    }

    fn speeds_valid(&self) -> bool {
        self.stages.iter().all(|stage| stage.speed > 0.0)
    }

    /// Checks the profile before it is used for a gate table.
    ///
    /// Descending positions are only enforced when `strict_positions` is set.
    pub fn validate(&self, strict_positions: bool) -> Result<(), GateError> {
        for (index, stage) in self.stages.iter().enumerate() {
            if !(stage.speed > 0.0) {
                return Err(GateError::InvalidSpeed {
                    stage: index + 1,
                    speed: stage.speed,
                });
            }
        }
        if strict_positions {
            let [a, b, c] = self.stages;
            if !(self.start_position > a.boundary
                && a.boundary > b.boundary
                && b.boundary > c.boundary)
            {
                return Err(GateError::InvalidStageOrder {
                    start: self.start_position,
                    s1: a.boundary,
                    s2: b.boundary,
                    vp: c.boundary,
                });
            }
        }
        Ok(())
    }

    /// Seconds spent in each stage, `[t1, t2, t3]`.
    pub fn stage_durations(&self) -> [f64; 3] {
        if !self.speeds_valid() {
            return [0.0; 3];
        }
        let [a, b, c] = self.stages;
        [
            (self.start_position - a.boundary) / a.speed,
            (a.boundary - b.boundary) / b.speed,
            (b.boundary - c.boundary) / c.speed,
        ]
    }

    pub fn total_cycle_time(&self) -> f64 {
        self.stage_durations().iter().sum()
    }

    /// Elapsed seconds when the screw reaches `position`.
    ///
    /// Returns 0.0 everywhere when any stage speed is not positive.
    pub fn elapsed_time(&self, position: f64) -> f64 {
        if !self.speeds_valid() {
            return 0.0;
        }
        let [a, b, c] = self.stages;
        let [t1, t2, _] = self.stage_durations();
        if position >= a.boundary {
            (self.start_position - position) / a.speed
        } else if position >= b.boundary {
            t1 + (a.boundary - position) / b.speed
        } else {
            t1 + t2 + (b.boundary - position) / c.speed
        }
    }
}
