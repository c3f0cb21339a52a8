//! Pipelines
//!
//! A set of jobs declared together, each naming the jobs it has to wait
//! for. Jobs are submitted in dependency order so that every upstream job
//! id is known by the time its dependents are submitted.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::domain::resources::{ResourceRequest, parse_time_limit};
use crate::domain::spec::{StageStep, StageStepError};

/// Rejected pipeline definition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Target(#[from] StageStepError),

    #[error("{job} depends on {dependency}, which the pipeline does not define")]
    UnknownDependency { job: String, dependency: String },

    #[error("dependency cycle between {}", .0.join(", "))]
    Cycle(Vec<String>),
}

/// One job of a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineJob {
    pub target: StageStep,
    pub resources: ResourceRequest,
    /// Keys (`stage@step`) of the jobs that must succeed first
    pub after: Vec<String>,
}

impl PipelineJob {
    pub fn key(&self) -> String {
        self.target.to_string()
    }

    /// Requested wall-clock hours; an unparseable limit counts as one hour
    pub fn hours(&self) -> f64 {
        parse_time_limit(&self.resources.time_limit).unwrap_or(1.0)
    }

    pub fn gpu_hours(&self) -> f64 {
        self.hours() * f64::from(self.resources.gpus)
    }

    pub fn cpu_hours(&self) -> f64 {
        self.hours() * f64::from(self.resources.cpus)
    }
}

/// A validated set of jobs with acyclic dependencies
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    jobs: BTreeMap<String, PipelineJob>,
}

impl Pipeline {
    /// Rejects dependencies on undefined jobs and dependency cycles
    pub fn new(jobs: impl IntoIterator<Item = PipelineJob>) -> Result<Self, PipelineError> {
        let mut by_key = BTreeMap::new();
        for mut job in jobs {
            let mut seen = BTreeSet::new();
            job.after.retain(|dep| seen.insert(dep.clone()));
            by_key.insert(job.key(), job);
        }

        for (key, job) in &by_key {
            if let Some(missing) = job.after.iter().find(|dep| !by_key.contains_key(*dep)) {
                return Err(PipelineError::UnknownDependency {
                    job: key.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        let pipeline = Self { jobs: by_key };
        pipeline.execution_order(&pipeline.keys().cloned().collect())?;
        Ok(pipeline)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&PipelineJob> {
        self.jobs.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.jobs.keys()
    }

    pub fn jobs(&self) -> impl Iterator<Item = &PipelineJob> {
        self.jobs.values()
    }

    /// `roots` plus everything they transitively depend on
    pub fn with_dependencies<'a>(&self, roots: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
        let mut selected = BTreeSet::new();
        let mut stack: Vec<&str> = roots.into_iter().collect();

        while let Some(key) = stack.pop() {
            let Some(job) = self.jobs.get(key) else {
                continue;
            };
            if selected.insert(key.to_string()) {
                stack.extend(job.after.iter().map(String::as_str));
            }
        }

        selected
    }

    /// Groups `selected` into batches; every job comes after all of its
    /// selected dependencies and jobs within a batch are independent
    ///
    /// Dependencies outside `selected` are ignored. Keys in each batch are
    /// sorted.
    pub fn execution_order(
        &self,
        selected: &BTreeSet<String>,
    ) -> Result<Vec<Vec<String>>, PipelineError> {
        let mut waiting_on: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for key in selected {
            let Some(job) = self.jobs.get(key) else {
                continue;
            };
            let deps: Vec<&str> = job
                .after
                .iter()
                .map(String::as_str)
                .filter(|dep| selected.contains(*dep))
                .collect();
            for dep in &deps {
                dependents.entry(*dep).or_default().push(key.as_str());
            }
            waiting_on.insert(key.as_str(), deps.len());
        }

        let mut ready: Vec<&str> = waiting_on
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(key, _)| *key)
            .collect();
        let mut batches = Vec::new();
        let mut placed = 0;

        while !ready.is_empty() {
            let batch = std::mem::take(&mut ready);
            for done in &batch {
                for dependent in dependents.get(done).into_iter().flatten() {
                    if let Some(count) = waiting_on.get_mut(dependent) {
                        *count -= 1;
                        if *count == 0 {
                            ready.push(*dependent);
                        }
                    }
                }
            }
            ready.sort_unstable();
            placed += batch.len();
            batches.push(batch.into_iter().map(str::to_string).collect());
        }

        if placed < waiting_on.len() {
            let stuck = waiting_on
                .into_iter()
                .filter(|(_, count)| *count > 0)
                .map(|(key, _)| key.to_string())
                .collect();
            return Err(PipelineError::Cycle(stuck));
        }

        Ok(batches)
    }

    /// The submission plan for `selected`
    pub fn plan(&self, selected: &BTreeSet<String>) -> Result<PipelinePlan, PipelineError> {
        let batches = self
            .execution_order(selected)?
            .into_iter()
            .map(|keys| PlanBatch {
                jobs: keys
                    .iter()
                    .filter_map(|key| self.jobs.get(key).cloned())
                    .collect(),
            })
            .collect();

        Ok(PipelinePlan {
            batches,
            skipped: self.len().saturating_sub(selected.len()),
        })
    }
}

/// Jobs that can be submitted together
#[derive(Debug, Clone, PartialEq)]
pub struct PlanBatch {
    pub jobs: Vec<PipelineJob>,
}

impl PlanBatch {
    /// GPUs held if every job in the batch runs at once
    pub fn peak_gpus(&self) -> u32 {
        self.jobs.iter().map(|j| j.resources.gpus).sum()
    }

    pub fn peak_cpus(&self) -> u32 {
        self.jobs.iter().map(|j| j.resources.cpus).sum()
    }

    pub fn max_hours(&self) -> f64 {
        self.jobs.iter().map(PipelineJob::hours).fold(0.0, f64::max)
    }
}

/// Ordered batches plus requested totals
#[derive(Debug, Clone, PartialEq)]
pub struct PipelinePlan {
    pub batches: Vec<PlanBatch>,
    /// Pipeline jobs left out of the selection
    pub skipped: usize,
}

impl PipelinePlan {
    pub fn job_count(&self) -> usize {
        self.batches.iter().map(|b| b.jobs.len()).sum()
    }

    pub fn jobs(&self) -> impl Iterator<Item = &PipelineJob> {
        self.batches.iter().flat_map(|b| b.jobs.iter())
    }

    pub fn gpu_hours(&self) -> f64 {
        self.jobs().map(PipelineJob::gpu_hours).sum()
    }

    pub fn cpu_hours(&self) -> f64 {
        self.jobs().map(PipelineJob::cpu_hours).sum()
    }
}
