//! Real-time decisions as a pluggable mechanic.
use super::{Mechanic, MechanicContext, MechanicError, MechanicKind, MechanicOutcome};
use crate::clock::SharedClock;
use crate::config::EngineConfig;
use crate::events::EngineEnv;
use crate::realtime::{DecisionOutcome, PhaseView, RealTimeDecisionEngine, ScenarioReport};
use crate::threats::ThreatDatabase;

#[derive(Debug)]
pub struct RealTimeMechanic {
    engine: RealTimeDecisionEngine,
    last_view: Option<PhaseView>,
}

impl RealTimeMechanic {
    #[must_use]
    pub fn new(threats: ThreatDatabase, config: EngineConfig, clock: SharedClock) -> Self {
        Self {
            engine: RealTimeDecisionEngine::new(threats, config, clock),
            last_view: None,
        }
    }

    #[must_use]
    pub const fn engine(&self) -> &RealTimeDecisionEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut RealTimeDecisionEngine {
        &mut self.engine
    }

    /// Phase shown when the mechanic was activated.
    #[must_use]
    pub const fn opening_view(&self) -> Option<&PhaseView> {
        self.last_view.as_ref()
    }

    /// Submit against the current scenario.
    ///
    /// # Errors
    ///
    /// [`MechanicError::NotActive`] when no scenario is current, otherwise the
    /// engine's rejection.
    pub fn submit_current(
        &mut self,
        decision_id: &str,
        env: &mut EngineEnv<'_>,
    ) -> Result<DecisionOutcome, MechanicError> {
        let session_id = self
            .engine
            .current_scenario_id()
            .map(str::to_string)
            .ok_or(MechanicError::NotActive(MechanicKind::Realtime))?;
        Ok(self.engine.submit_decision(&session_id, decision_id, env)?)
    }

    #[must_use]
    pub fn outcome_from_report(report: &ScenarioReport) -> MechanicOutcome {
        let max_score = u32::try_from(report.decisions.len()).unwrap_or(u32::MAX);
        MechanicOutcome {
            kind: MechanicKind::Realtime,
            character: report.character,
            content_id: report.scenario_id.clone(),
            score: u32::try_from(report.optimal_count).unwrap_or(max_score),
            max_score,
            tier: report.tier,
            feedback: report.feedback.clone(),
        }
    }
}

impl Mechanic for RealTimeMechanic {
    fn kind(&self) -> MechanicKind {
        MechanicKind::Realtime
    }

    fn activate(
        &mut self,
        ctx: &MechanicContext,
        env: &mut EngineEnv<'_>,
    ) -> Result<(), MechanicError> {
        let view = self
            .engine
            .start_real_time_scenario(ctx.character, &ctx.target, ctx.urgency, env)?;
        self.last_view = Some(view);
        Ok(())
    }

    fn deactivate(&mut self, _env: &mut EngineEnv<'_>) {
        let cancelled = self.engine.cancel_all();
        if cancelled > 0 {
            log::debug!("cancelled {cancelled} real-time session(s)");
        }
        self.last_view = None;
    }

    fn is_active(&self) -> bool {
        self.engine.active_sessions() > 0
    }
}
