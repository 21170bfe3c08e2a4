// Cheapest CPU/memory reservation covering a measured run

use tracing::debug;

use super::decode::read_value;
use super::{Formulated, Formulation};
use crate::domain::{
    Constraint, LinearExpression, ObjectiveFunction, OptimizationProblem, Result, Solution,
    SolverError, Variable, VariableId,
};

/// Peak figures of one observed run
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UsageProfile {
    /// Wall-clock seconds
    pub execution_time: f64,
    pub peak_cpu_percent: f64,
    pub peak_memory_mb: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceTuningProblem {
    pub usage: UsageProfile,
    /// Longest acceptable run, in seconds
    pub time_limit: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub memory_limit_mb: Option<f64>,
    pub cost_per_cpu: f64,
    pub cost_per_mb: f64,
    /// Multiplier applied to the observed peaks
    #[cfg_attr(feature = "serde", serde(default = "default_headroom"))]
    pub headroom: f64,
}

fn default_headroom() -> f64 {
    ResourceTuningProblem::DEFAULT_HEADROOM
}

impl ResourceTuningProblem {
    pub const DEFAULT_HEADROOM: f64 = 1.2;

    pub fn new(usage: UsageProfile, time_limit: f64, cost_per_cpu: f64, cost_per_mb: f64) -> Self {
        Self {
            usage,
            time_limit,
            memory_limit_mb: None,
            cost_per_cpu,
            cost_per_mb,
            headroom: Self::DEFAULT_HEADROOM,
        }
    }

    pub fn with_memory_limit(mut self, megabytes: f64) -> Self {
        self.memory_limit_mb = Some(megabytes);
        self
    }

    pub fn with_headroom(mut self, headroom: f64) -> Self {
        self.headroom = headroom;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceTuningLayout {
    pub cpu: VariableId,
    pub memory: VariableId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ResourceTuningPlan {
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub total_cost: f64,
}

impl Formulation for ResourceTuningProblem {
    type Layout = ResourceTuningLayout;
    type Output = ResourceTuningPlan;

    fn validate(&self) -> Result<()> {
        let named = [
            ("execution time", self.usage.execution_time),
            ("peak cpu", self.usage.peak_cpu_percent),
            ("peak memory", self.usage.peak_memory_mb),
            ("cost per cpu", self.cost_per_cpu),
            ("cost per MB", self.cost_per_mb),
            ("headroom", self.headroom),
        ];
        if let Some((what, value)) = named.iter().find(|(_, v)| !v.is_finite() || *v < 0.0) {
            return Err(SolverError::InvalidInput(format!(
                "{what} must be a non-negative number, got {value}"
            )));
        }
        if !self.time_limit.is_finite() || self.time_limit <= 0.0 {
            return Err(SolverError::InvalidInput(format!(
                "time limit must be positive, got {}",
                self.time_limit
            )));
        }
        if let Some(limit) = self.memory_limit_mb {
            if !limit.is_finite() || limit <= 0.0 {
                return Err(SolverError::InvalidInput(format!(
                    "memory limit must be positive, got {limit}"
                )));
            }
        }
        Ok(())
    }

    fn build(&self) -> Result<Formulated<ResourceTuningLayout>> {
        self.validate()?;

        let mut problem = OptimizationProblem::new("resource_tuning");
        let cpu = problem.add_variable(Variable::continuous("cpu_percent"));
        let memory = problem.add_variable(Variable::continuous("memory_mb"));

        problem.set_objective(ObjectiveFunction::minimize(
            cpu * self.cost_per_cpu + memory * self.cost_per_mb,
        ))?;

        problem.add_constraint(
            Constraint::geq(cpu, self.headroom * self.usage.peak_cpu_percent)
                .with_name("cpu_headroom"),
        )?;
        problem.add_constraint(
            Constraint::geq(memory, self.headroom * self.usage.peak_memory_mb)
                .with_name("memory_headroom"),
        )?;
        // constant row: the measured run either met the limit or the model is infeasible
        problem.add_constraint(
            Constraint::leq(
                LinearExpression::constant(self.usage.execution_time),
                self.time_limit,
            )
            .with_name("time_limit"),
        )?;
        if let Some(limit) = self.memory_limit_mb {
            problem.add_constraint(Constraint::leq(memory, limit).with_name("memory_limit"))?;
        }

        debug!(
            constraints = problem.num_constraints(),
            "built resource tuning model"
        );

        Ok(Formulated {
            problem,
            layout: ResourceTuningLayout { cpu, memory },
        })
    }

    fn decode(
        &self,
        layout: &ResourceTuningLayout,
        solution: &Solution,
    ) -> Result<ResourceTuningPlan> {
        let cpu_percent = read_value(solution, layout.cpu)?;
        let memory_mb = read_value(solution, layout.memory)?;
        Ok(ResourceTuningPlan {
            cpu_percent,
            memory_mb,
            total_cost: self.cost_per_cpu * cpu_percent + self.cost_per_mb * memory_mb,
        })
    }
}
