//! The demonstration instrument
//!
//! Two divisions, each played from its own keyboard. Divisions are created in
//! order, so the engine numbers them as they appear here.

use anyhow::{anyhow, Result};

use organum_core::engine::{Command, CommandSender, EngineEvent};
use organum_core::synth::{BuildRequest, Footage, Pan, RankBuilder, StopDefinition, Tuning};
use organum_core::NKEYBD;

/// One division to build
pub struct DivisionPlan {
    pub name: &'static str,
    pub section: usize,
    pub keyboard: u8,
    pub swell: f32,
    pub tfreq: f32,
    pub tmodd: f32,
    pub stops: Vec<StopDefinition>,
}

/// Great on keyboard 0, enclosed Swell on keyboard 1
pub fn demo_organ() -> Vec<DivisionPlan> {
    let mut swell_flute = StopDefinition::flute(Footage::feet(8));
    swell_flute.pan = Pan::Left;
    let mut swell_reed = StopDefinition::trumpet(Footage::feet(8));
    swell_reed.pan = Pan::Right;
    swell_reed.delay_ms = 10;

    vec![
        DivisionPlan {
            name: "Great",
            section: 0,
            keyboard: 0,
            swell: 1.0,
            tfreq: 4.0,
            tmodd: 0.3,
            stops: vec![
                StopDefinition::principal(Footage::feet(8)),
                StopDefinition::principal(Footage::feet(4)),
                StopDefinition::flute(Footage::feet(8)),
            ],
        },
        DivisionPlan {
            name: "Swell",
            section: 1,
            keyboard: 1,
            swell: 0.6,
            tfreq: 5.0,
            tmodd: 0.2,
            stops: vec![swell_flute, StopDefinition::flute(Footage::feet(4)), swell_reed],
        },
    ]
}

/// Queue every division and rank of `plans` on the build thread
///
/// Returns the number of ranks requested.
pub fn request_build(builder: &RankBuilder, plans: &[DivisionPlan], tuning: Tuning) -> Result<usize> {
    let stopped = |_| anyhow!("rank builder has stopped");
    let mut ranks = 0;
    for (d, plan) in plans.iter().enumerate() {
        log::info!("Building division '{}' ({} stops)", plan.name, plan.stops.len());
        builder
            .send(BuildRequest::NewDivision {
                section: plan.section,
                keyboard: Some(plan.keyboard),
                swell: plan.swell,
                tfreq: plan.tfreq,
                tmodd: plan.tmodd,
            })
            .map_err(stopped)?;
        for (r, stop) in plan.stops.iter().enumerate() {
            builder
                .send(BuildRequest::Rank {
                    division: d as u8,
                    rank: r as u8,
                    stop: Box::new(stop.clone()),
                    tuning,
                })
                .map_err(stopped)?;
            ranks += 1;
        }
    }
    Ok(ranks)
}

/// Engages each rank as soon as the engine reports it installed
pub struct Registration {
    expected: usize,
    engaged: usize,
    rejected: usize,
}

impl Registration {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            engaged: 0,
            rejected: 0,
        }
    }

    /// React to one engine event
    pub fn handle(&mut self, event: EngineEvent, controls: &mut CommandSender) {
        match event {
            EngineEvent::DivisionCreated { division } => {
                log::info!("Division {} ready", division);
            }
            EngineEvent::RankInstalled { division, rank } => {
                let engage = Command::SetRankMask {
                    division,
                    rank,
                    linkage: 0,
                    bit: NKEYBD as u8,
                };
                match controls.send(engage) {
                    Ok(()) => {
                        self.engaged += 1;
                        log::info!("Engaged rank {} of division {}", rank, division);
                    }
                    Err(e) => log::warn!("Could not engage rank {} of division {}: {}", rank, division, e),
                }
            }
            EngineEvent::DivisionRejected { section } => {
                log::warn!("Engine refused a division on section {}", section);
            }
            EngineEvent::RankRejected { division, rank } => {
                self.rejected += 1;
                log::warn!("Engine refused rank {} of division {}", rank, division);
            }
        }
    }

    /// Every requested rank is either engaged or refused
    pub fn is_complete(&self) -> bool {
        self.engaged + self.rejected >= self.expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use organum_core::engine::{command_channel, Command};

    #[test]
    fn test_demo_organ_fits_engine() {
        let plans = demo_organ();
        assert_eq!(plans.len(), 2);
        assert!(plans.iter().all(|p| (p.keyboard as usize) < NKEYBD));
        assert!(plans.iter().all(|p| p.section < organum_core::NASECT));
        assert!(plans.iter().all(|p| p.stops.len() <= organum_core::NRANKS));
    }

    #[test]
    fn test_registration_engages_installed_ranks() {
        let (mut tx, mut rx) = command_channel();
        let mut registration = Registration::new(2);

        registration.handle(EngineEvent::DivisionCreated { division: 0 }, &mut tx);
        registration.handle(EngineEvent::RankInstalled { division: 0, rank: 1 }, &mut tx);
        assert!(!registration.is_complete());
        registration.handle(EngineEvent::RankInstalled { division: 1, rank: 0 }, &mut tx);
        assert!(registration.is_complete());

        let mut got = Vec::new();
        rx.drain(|c| got.push(c));
        assert_eq!(
            got,
            vec![
                Command::SetRankMask {
                    division: 0,
                    rank: 1,
                    linkage: 0,
                    bit: NKEYBD as u8
                },
                Command::SetRankMask {
                    division: 1,
                    rank: 0,
                    linkage: 0,
                    bit: NKEYBD as u8
                },
            ]
        );
    }

    #[test]
    fn test_refused_ranks_complete_registration() {
        let (mut tx, mut rx) = command_channel();
        let mut registration = Registration::new(2);

        registration.handle(EngineEvent::DivisionRejected { section: 7 }, &mut tx);
        registration.handle(EngineEvent::RankRejected { division: 3, rank: 0 }, &mut tx);
        assert!(!registration.is_complete());
        registration.handle(EngineEvent::RankInstalled { division: 0, rank: 0 }, &mut tx);
        assert!(registration.is_complete());

        let mut got = Vec::new();
        rx.drain(|c| got.push(c));
        assert_eq!(got.len(), 1);
    }
}
