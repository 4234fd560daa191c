//! Ordered multi-step operations (backup, update).
//!
//! A [`Pipeline`] runs one stage at a time. The first failing stage is wrapped
//! in [`Error::Step`] and, propagated with `?`, short-circuits everything after
//! it. Callers inspect [`Pipeline::completed`] to decide what to compensate.

use std::{fmt, future::Future, time::Instant};

use crate::{errors::Error, Result};

pub struct Pipeline<S> {
    name: &'static str,
    run_id: String,
    completed: Vec<S>,
}

impl<S> Pipeline<S>
where
    S: Copy + PartialEq + fmt::Display,
{
    pub fn new(name: &'static str, run_id: impl Into<String>) -> Self {
        Self {
            name,
            run_id: run_id.into(),
            completed: Vec::new(),
        }
    }

    pub async fn step<T, F>(&mut self, stage: S, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        tracing::info!(pipeline = self.name, run_id = %self.run_id, stage = %stage, "step started");

        match fut.await {
            Ok(v) => {
                tracing::info!(
                    pipeline = self.name,
                    run_id = %self.run_id,
                    stage = %stage,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "step finished"
                );
                self.completed.push(stage);
                Ok(v)
            }
            Err(e) => {
                tracing::warn!(
                    pipeline = self.name,
                    run_id = %self.run_id,
                    stage = %stage,
                    error = %e,
                    "step failed"
                );
                Err(Error::Step {
                    stage: stage.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    pub fn completed(&self) -> &[S] {
        &self.completed
    }

    pub fn has_completed(&self, stage: S) -> bool {
        self.completed.contains(&stage)
    }
}
