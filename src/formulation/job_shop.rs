// Job-shop scheduling with disjunctive big-M machine constraints
//
// Every job is an ordered chain of tasks, each bound to one machine. The
// model carries an integer start per task, an integer makespan, and one
// binary ordering variable per pair of tasks sharing a machine. For such a
// pair `(a, b)` with ordering `z` and horizon `H`:
//
// ```text
// start(a) + dur(a) <= start(b) + H * (1 - z)    // z = 1: a runs first
// start(b) + dur(b) <= start(a) + H * z          // z = 0: b runs first
// ```
//
// `H` is the sum of all durations, which bounds any schedule without
// needless idle time, so the relaxed side never binds. The number of
// ordering variables grows quadratically with the tasks per machine.

use std::fmt;

use tracing::{debug, warn};

use super::decode::read_value;
use super::{Formulated, Formulation};
use crate::domain::{
    Constraint, LinearExpression, ObjectiveFunction, OptimizationProblem, Result, Solution,
    SolverError, Variable, VariableId,
};

/// One operation: which machine, and for how long
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Task {
    pub machine: usize,
    pub duration: u32,
}

impl Task {
    pub fn new(machine: usize, duration: u32) -> Self {
        Self { machine, duration }
    }
}

/// Tasks of one job, in execution order
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Job {
    pub tasks: Vec<Task>,
}

impl Job {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }
}

impl From<Vec<(usize, u32)>> for Job {
    fn from(tasks: Vec<(usize, u32)>) -> Self {
        Self::new(tasks.into_iter().map(|(m, d)| Task::new(m, d)).collect())
    }
}

/// Position of a task inside the instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TaskRef {
    pub job: usize,
    pub task: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JobShopProblem {
    pub jobs: Vec<Job>,
    pub num_machines: usize,
}

impl JobShopProblem {
    pub fn new(jobs: Vec<Job>, num_machines: usize) -> Self {
        Self { jobs, num_machines }
    }

    fn task(&self, at: TaskRef) -> Task {
        self.jobs[at.job].tasks[at.task]
    }

    /// Sum of every task duration; the big-M of the disjunctive rows.
    pub fn horizon(&self) -> u64 {
        self.jobs
            .iter()
            .flat_map(|job| &job.tasks)
            .map(|task| u64::from(task.duration))
            .sum()
    }

    /// Tasks grouped per machine, in (job, task) order. Tasks naming a
    /// machine outside `0..num_machines` are left out.
    pub fn machine_tasks(&self) -> Vec<Vec<TaskRef>> {
        let mut per_machine = vec![Vec::new(); self.num_machines];
        for (job, entry) in self.jobs.iter().enumerate() {
            for (task, t) in entry.tasks.iter().enumerate() {
                if let Some(slot) = per_machine.get_mut(t.machine) {
                    slot.push(TaskRef { job, task });
                }
            }
        }
        per_machine
    }
}

/// Binary variable deciding which of two same-machine tasks runs first
#[derive(Debug, Clone, PartialEq)]
pub struct OrderingPair {
    pub machine: usize,
    /// Runs first when the variable is 1
    pub first: TaskRef,
    /// Runs first when the variable is 0
    pub second: TaskRef,
    pub variable: VariableId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobShopLayout {
    /// `starts[job][task]`
    pub starts: Vec<Vec<VariableId>>,
    pub makespan: VariableId,
    pub orderings: Vec<OrderingPair>,
    pub horizon: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ScheduledTask {
    pub job: usize,
    pub task: usize,
    pub start: u64,
    pub duration: u32,
}

impl ScheduledTask {
    pub fn end(&self) -> u64 {
        self.start + u64::from(self.duration)
    }
}

/// Tasks of one machine sorted by start time
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MachineTimeline {
    pub machine: usize,
    pub tasks: Vec<ScheduledTask>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct JobShopSchedule {
    pub makespan: u64,
    pub machines: Vec<MachineTimeline>,
}

impl JobShopSchedule {
    /// Tasks of `job` in task order.
    pub fn job_tasks(&self, job: usize) -> Vec<ScheduledTask> {
        let mut tasks: Vec<ScheduledTask> = self
            .machines
            .iter()
            .flat_map(|m| m.tasks.iter().copied())
            .filter(|t| t.job == job)
            .collect();
        tasks.sort_by_key(|t| t.task);
        tasks
    }
}

impl fmt::Display for JobShopSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "makespan {}", self.makespan)?;
        for timeline in &self.machines {
            write!(f, "M{}:", timeline.machine)?;
            for t in &timeline.tasks {
                write!(f, " J{}T{}[{}..{})", t.job, t.task, t.start, t.end())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl Formulation for JobShopProblem {
    type Layout = JobShopLayout;
    type Output = JobShopSchedule;

    fn validate(&self) -> Result<()> {
        if self.num_machines == 0 {
            return Err(SolverError::InvalidInput(
                "job shop needs at least one machine".into(),
            ));
        }
        if self.jobs.is_empty() {
            return Err(SolverError::InvalidInput(
                "job shop needs at least one job".into(),
            ));
        }
        for (j, job) in self.jobs.iter().enumerate() {
            if job.tasks.is_empty() {
                return Err(SolverError::InvalidInput(format!("job {j} has no tasks")));
            }
            for (t, task) in job.tasks.iter().enumerate() {
                if task.machine >= self.num_machines {
                    return Err(SolverError::InvalidInput(format!(
                        "job {j} task {t} uses machine {} but only {} machines exist",
                        task.machine, self.num_machines
                    )));
                }
                if task.duration == 0 {
                    return Err(SolverError::InvalidInput(format!(
                        "job {j} task {t} has a zero duration"
                    )));
                }
            }
        }
        Ok(())
    }

    fn build(&self) -> Result<Formulated<JobShopLayout>> {
        self.validate()?;
        let horizon = self.horizon();
        let big_m = horizon as f64;

        let mut problem = OptimizationProblem::new("job_shop").with_description(format!(
            "{} jobs on {} machines, horizon {}",
            self.jobs.len(),
            self.num_machines,
            horizon
        ));

        let starts: Vec<Vec<VariableId>> = self
            .jobs
            .iter()
            .enumerate()
            .map(|(j, job)| {
                (0..job.tasks.len())
                    .map(|t| problem.add_variable(Variable::integer(format!("start_{j}_{t}"))))
                    .collect()
            })
            .collect();
        let makespan = problem.add_variable(Variable::integer("makespan"));
        let start_of = |at: TaskRef| starts[at.job][at.task];

        for (j, job) in self.jobs.iter().enumerate() {
            for (t, pair) in job.tasks.windows(2).enumerate() {
                let (current, next) = (starts[j][t], starts[j][t + 1]);
                problem.add_constraint(
                    Constraint::geq(next, current + f64::from(pair[0].duration))
                        .with_name(format!("precedence_{j}_{t}")),
                )?;
            }
        }

        let mut orderings = Vec::new();
        for (machine, tasks) in self.machine_tasks().into_iter().enumerate() {
            for (i, &first) in tasks.iter().enumerate() {
                for &second in &tasks[i + 1..] {
                    let tag = format!(
                        "m{machine}_{}_{}_{}_{}",
                        first.job, first.task, second.job, second.task
                    );
                    let z = problem.add_variable(Variable::binary(format!("order_{tag}")));
                    let (s1, d1) = (start_of(first), f64::from(self.task(first).duration));
                    let (s2, d2) = (start_of(second), f64::from(self.task(second).duration));

                    problem.add_constraint(
                        Constraint::leq(s1 + d1, (s2 + big_m) - z * big_m)
                            .with_name(format!("first_before_second_{tag}")),
                    )?;
                    problem.add_constraint(
                        Constraint::leq(s2 + d2, LinearExpression::from(s1) + z * big_m)
                            .with_name(format!("second_before_first_{tag}")),
                    )?;

                    orderings.push(OrderingPair {
                        machine,
                        first,
                        second,
                        variable: z,
                    });
                }
            }
        }

        for (j, job) in self.jobs.iter().enumerate() {
            let last = job.tasks.len() - 1;
            problem.add_constraint(
                Constraint::geq(makespan, starts[j][last] + f64::from(job.tasks[last].duration))
                    .with_name(format!("makespan_{j}")),
            )?;
        }

        problem.set_objective(ObjectiveFunction::minimize(makespan))?;

        debug!(
            horizon,
            orderings = orderings.len(),
            variables = problem.num_variables(),
            constraints = problem.num_constraints(),
            "built job shop model"
        );

        Ok(Formulated {
            problem,
            layout: JobShopLayout {
                starts,
                makespan,
                orderings,
                horizon,
            },
        })
    }

    fn decode(&self, layout: &JobShopLayout, solution: &Solution) -> Result<JobShopSchedule> {
        let mut machines: Vec<MachineTimeline> = (0..self.num_machines)
            .map(|machine| MachineTimeline {
                machine,
                tasks: Vec::new(),
            })
            .collect();

        let mut makespan = 0;
        for (j, job) in self.jobs.iter().enumerate() {
            for (t, task) in job.tasks.iter().enumerate() {
                let value = read_value(solution, layout.starts[j][t])?;
                // integral within solver tolerance
                let start = value.round().max(0.0) as u64;
                let scheduled = ScheduledTask {
                    job: j,
                    task: t,
                    start,
                    duration: task.duration,
                };
                makespan = makespan.max(scheduled.end());
                machines[task.machine].tasks.push(scheduled);
            }
        }

        for timeline in &mut machines {
            timeline.tasks.sort_by_key(|t| t.start);
            if let Some(pair) = timeline.tasks.windows(2).find(|w| w[0].end() > w[1].start) {
                return Err(SolverError::InconsistentSolution(format!(
                    "machine {}: job {} task {} runs until {} but job {} task {} starts at {}",
                    timeline.machine,
                    pair[0].job,
                    pair[0].task,
                    pair[0].end(),
                    pair[1].job,
                    pair[1].task,
                    pair[1].start
                )));
            }
        }

        let reported = read_value(solution, layout.makespan)?;
        if (reported - makespan as f64).abs() > 0.5 {
            warn!(
                reported,
                makespan, "solver makespan differs from the decoded schedule"
            );
        }

        Ok(JobShopSchedule { makespan, machines })
    }
}
