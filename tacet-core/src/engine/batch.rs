//! Batch execution over a list of input files.
//!
//! Files run through the coordinator one by one, or through a fixed-size
//! worker pool when the resolved configuration permits multi-worker
//! execution (energy mode only). Each worker owns the waveform and
//! buffers of its current file; the coordinator itself is shared
//! read-only. Results are tagged with their input index and assembled in
//! input order, so worker scheduling never changes the report.
//!
//! A failing file becomes a failure record with its error kind; the batch
//! always continues. Cancellation is not supported mid-file: callers stop
//! submitting further jobs instead.

use std::path::PathBuf;

use tracing::{info, warn};

use super::Coordinator;
use crate::report::{BatchReport, FileOutcome};

/// One unit of batch work: where to read and where to write.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Runs a coordinator over many files.
pub struct BatchOrchestrator<'a> {
    coordinator: &'a Coordinator,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(coordinator: &'a Coordinator) -> Self {
        Self { coordinator }
    }

    /// Process all jobs and return outcomes in input order.
    pub fn run(&self, jobs: &[BatchJob]) -> BatchReport {
        if jobs.is_empty() {
            return BatchReport::from_outcomes(Vec::new());
        }

        let workers = self.coordinator.resolved().worker_count.min(jobs.len());
        info!(files = jobs.len(), workers, "batch started");

        let outcomes = if workers > 1 {
            self.run_pooled(jobs, workers)
        } else {
            jobs.iter().map(|job| self.process_one(job)).collect()
        };

        let report = BatchReport::from_outcomes(outcomes);
        info!(
            total = report.summary.total_files,
            succeeded = report.summary.succeeded,
            failed = report.summary.failed,
            "batch finished"
        );
        report
    }

    fn process_one(&self, job: &BatchJob) -> FileOutcome {
        match self.coordinator.process_file(&job.input, &job.output) {
            Ok(result) => FileOutcome::Success {
                input: job.input.clone(),
                result,
            },
            Err(err) => {
                warn!(
                    input = %job.input.display(),
                    error = %err,
                    "file failed; batch continues"
                );
                FileOutcome::Failure {
                    input: job.input.clone(),
                    kind: (&err).into(),
                    message: err.to_string(),
                }
            }
        }
    }

    /// Fixed-size pool: jobs drained from a shared channel, results
    /// collected with their index and re-ordered afterwards.
    fn run_pooled(&self, jobs: &[BatchJob], workers: usize) -> Vec<FileOutcome> {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, &BatchJob)>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<(usize, FileOutcome)>();

        for entry in jobs.iter().enumerate() {
            // Unbounded channel with a live receiver: send cannot fail.
            let _ = job_tx.send(entry);
        }
        drop(job_tx);

        let mut slots: Vec<Option<FileOutcome>> = Vec::new();
        slots.resize_with(jobs.len(), || None);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    while let Ok((idx, job)) = job_rx.recv() {
                        let outcome = self.process_one(job);
                        let _ = result_tx.send((idx, outcome));
                    }
                });
            }
            drop(result_tx);

            while let Ok((idx, outcome)) = result_rx.recv() {
                slots[idx] = Some(outcome);
            }
        });

        slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| match slot {
                Some(outcome) => outcome,
                // A worker died mid-file (panic). Record it as a failure
                // rather than dropping the entry.
                None => FileOutcome::Failure {
                    input: jobs[idx].input.clone(),
                    kind: crate::report::FailureKind::Other,
                    message: "worker terminated before producing a result".into(),
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::error::Result;
    use crate::model::{ModelHandle, VadModel};
    use crate::report::FailureKind;

    use std::fs;
    use std::path::Path;

    use hound::{SampleFormat, WavSpec, WavWriter};

    fn write_speech_wav(path: &Path) {
        // 8 s with a 2 s silent middle; valid for the default preset scan.
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for i in 0..(8000 * 16) {
            let t_ms = i / 16;
            let voiced = t_ms < 3000 || t_ms >= 5000;
            let sample: i16 = if voiced {
                if i % 2 == 0 {
                    8192
                } else {
                    -8192
                }
            } else {
                0
            };
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn jobs_in(dir: &Path, names: &[&str]) -> Vec<BatchJob> {
        names
            .iter()
            .map(|name| BatchJob {
                input: dir.join(name),
                output: dir.join(format!("out-{name}")),
            })
            .collect()
    }

    #[test]
    fn batch_continues_past_a_failing_file() {
        let dir = tempfile::tempdir().unwrap();
        write_speech_wav(&dir.path().join("a.wav"));
        fs::write(dir.path().join("b.wav"), b"not a wav at all").unwrap();
        write_speech_wav(&dir.path().join("c.wav"));

        let coordinator = Coordinator::new(EngineConfig::default(), None).unwrap();
        let report =
            BatchOrchestrator::new(&coordinator).run(&jobs_in(dir.path(), &["a.wav", "b.wav", "c.wav"]));

        assert_eq!(report.summary.total_files, 3);
        assert_eq!(report.summary.succeeded, 2);
        assert_eq!(report.summary.failed, 1);

        assert!(report.outcomes[0].is_success());
        match &report.outcomes[1] {
            FileOutcome::Failure { kind, input, .. } => {
                assert_eq!(*kind, FailureKind::Decode);
                assert!(input.ends_with("b.wav"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(report.outcomes[2].is_success());
    }

    #[test]
    fn pooled_outcomes_keep_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let names: Vec<String> = (0..6).map(|i| format!("f{i}.wav")).collect();
        for name in &names {
            write_speech_wav(&dir.path().join(name));
        }
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let jobs = jobs_in(dir.path(), &name_refs);

        let config = EngineConfig {
            worker_count: 4,
            ..EngineConfig::default()
        };
        let coordinator = Coordinator::new(config, None).unwrap();
        let report = BatchOrchestrator::new(&coordinator).run(&jobs);

        assert_eq!(report.summary.succeeded, 6);
        for (outcome, job) in report.outcomes.iter().zip(&jobs) {
            match outcome {
                FileOutcome::Success { input, .. } => assert_eq!(input, &job.input),
                other => panic!("expected success, got {other:?}"),
            }
        }
    }

    #[test]
    fn empty_job_list_yields_empty_report() {
        let coordinator = Coordinator::new(EngineConfig::default(), None).unwrap();
        let report = BatchOrchestrator::new(&coordinator).run(&[]);
        assert_eq!(report.summary.total_files, 0);
        assert!(report.outcomes.is_empty());
    }

    struct AlwaysSpeechModel;

    impl VadModel for AlwaysSpeechModel {
        fn sample_rate(&self) -> u32 {
            16_000
        }

        fn frame_size(&self) -> usize {
            512
        }

        fn infer(&mut self, _frame: &[f32]) -> Result<f32> {
            Ok(0.95)
        }

        fn reset(&mut self) {}
    }

    #[test]
    fn vad_batch_runs_sequentially_and_shares_one_model() {
        let dir = tempfile::tempdir().unwrap();
        write_speech_wav(&dir.path().join("a.wav"));
        write_speech_wav(&dir.path().join("b.wav"));

        let config = EngineConfig {
            use_vad: true,
            worker_count: 8, // downgraded to 1
            ..EngineConfig::default()
        };
        let coordinator =
            Coordinator::new(config, Some(ModelHandle::new(AlwaysSpeechModel))).unwrap();
        assert!(coordinator.resolved().parallelism_downgraded);

        let report =
            BatchOrchestrator::new(&coordinator).run(&jobs_in(dir.path(), &["a.wav", "b.wav"]));
        assert_eq!(report.summary.succeeded, 2);
    }
}
