//! Pass scheduler for orchestrating a rewrite run.
//!
//! The `PassScheduler` runs an ordered list of passes over a [`Program`]. Each pass completes
//! over every method before the next one starts, so later passes observe everything earlier
//! passes synthesized (profiles, counters, rewritten signatures).
//!
//! Within one per-method pass, bodies are processed on the rayon thread pool when
//! [`RewriteConfig::parallel`] is set. Every body is moved out of the program for the duration
//! of the pass and moved back afterwards, whether the pass succeeded or not.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::{
    ir::{MethodId, Program},
    rewrite::{
        ArrayPropagationPass, CallTrackingPass, ConstructorPatchPass, EventKind, EventLog,
        FieldAccessPass, InstanceInstrumentationPass, RewriteConfig, RewriteContext, RewritePass,
        RewriteStats, SignatureRewritePass, StepOutcome, TypeProfilingPass,
    },
    verify, Result,
};

/// Outcome of a completed rewrite run.
#[derive(Debug)]
pub struct RewriteReport {
    /// Counts derived from the event log.
    pub stats: RewriteStats,
    /// Number of rewrite steps per outcome.
    pub outcomes: BTreeMap<StepOutcome, usize>,
    /// Every event recorded during the run.
    pub events: EventLog,
    /// Name of the shared counter class, if it was created.
    pub counter_class: Option<String>,
    /// Names of every instrumented class, sorted.
    pub instrumented_classes: Vec<String>,
    /// Names of every synthesized array wrapper, sorted.
    pub wrappers: Vec<String>,
}

impl RewriteReport {
    fn from_context(ctx: RewriteContext, program: &Program) -> Self {
        let stats = ctx.stats();
        let outcomes = ctx.events.count_by_outcome();
        let counter_class = program
            .contains_class(ctx.counters.class_name())
            .then(|| ctx.counters.class_name().to_string());
        let mut instrumented_classes: Vec<String> =
            ctx.profiles.iter().map(|p| p.key().clone()).collect();
        instrumented_classes.sort();
        let mut wrappers: Vec<String> = ctx.wrappers.iter().map(|w| w.key().clone()).collect();
        wrappers.sort();

        Self {
            stats,
            outcomes,
            events: ctx.events,
            counter_class,
            instrumented_classes,
            wrappers,
        }
    }
}

/// Runs rewrite passes in order over a program.
#[derive(Default)]
pub struct PassScheduler {
    passes: Vec<Box<dyn RewritePass>>,
}

impl PassScheduler {
    /// Creates a scheduler without passes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard pipeline for `config`.
    ///
    /// Instance instrumentation runs first so every profile exists before any body is scanned.
    /// Type profiling sees raw arrays, so it runs before array propagation. Signatures are
    /// rewritten for the whole program before any body is, so every call site sees the final
    /// callee signatures.
    #[must_use]
    pub fn for_config(config: &RewriteConfig) -> Self {
        let mut scheduler = Self::new();
        if config.enable_object_profiling {
            scheduler.add(InstanceInstrumentationPass);
            scheduler.add(ConstructorPatchPass);
        }
        if config.enable_type_profiling {
            scheduler.add(TypeProfilingPass);
        }
        if config.enable_object_profiling {
            scheduler.add(FieldAccessPass);
        }
        if config.enable_call_tracking {
            scheduler.add(CallTrackingPass);
        }
        if config.enable_array_wrapping {
            scheduler.add(SignatureRewritePass);
            scheduler.add(ArrayPropagationPass);
        }
        scheduler
    }

    /// Appends a pass.
    pub fn add(&mut self, pass: impl RewritePass + 'static) -> &mut Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// Names of the scheduled passes, in order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Runs every pass once, in order.
    ///
    /// Returns `true` if any pass changed the program.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a pass. Bodies taken out for that pass are restored
    /// before the error is returned.
    pub fn run(&mut self, program: &Program, ctx: &RewriteContext) -> Result<bool> {
        for pass in &mut self.passes {
            pass.initialize(ctx)?;
        }

        let mut any_changed = false;
        for pass in &self.passes {
            ctx.events
                .record(EventKind::PassStarted)
                .message(pass.description())
                .pass(pass.name());
            log::debug!("running pass {}", pass.name());

            let changed = if pass.is_global() {
                pass.run_global(program, ctx)?
            } else {
                Self::run_per_method(pass.as_ref(), program, ctx)?
            };
            any_changed |= changed;

            ctx.events
                .record(EventKind::PassCompleted)
                .message(if changed { "changed" } else { "unchanged" })
                .pass(pass.name());
        }

        for pass in &mut self.passes {
            pass.finalize(ctx)?;
        }
        Ok(any_changed)
    }

    fn run_per_method(pass: &dyn RewritePass, program: &Program, ctx: &RewriteContext) -> Result<bool> {
        let methods: Vec<MethodId> = program
            .application_methods()
            .into_iter()
            .filter(|id| pass.should_run(id, program, ctx))
            .collect();

        let run_one = |id: &MethodId| -> Result<bool> {
            let Some(mut body) = program.take_body(id) else {
                return Ok(false);
            };
            let result = pass.run_on_method(id, &mut body, program, ctx);
            program.restore_body(id, body)?;
            if let Ok(true) = result {
                ctx.mark_rewritten(id);
            }
            result
        };

        let results: Vec<Result<bool>> = if ctx.config.parallel {
            methods.par_iter().map(run_one).collect()
        } else {
            methods.iter().map(run_one).collect()
        };

        let mut changed = false;
        for result in results {
            changed |= result?;
        }
        Ok(changed)
    }
}

/// Rewrites `program` in place according to `config`.
///
/// Runs the pass pipeline of [`PassScheduler::for_config`] and, if [`RewriteConfig::verify`]
/// is set, the verifier over the result.
///
/// # Errors
///
/// Returns the first error raised by a pass, or [`crate::Error::Verification`] if the rewritten
/// program fails verification.
pub fn rewrite_program(program: &Program, config: RewriteConfig) -> Result<RewriteReport> {
    let ctx = RewriteContext::new(config);
    let mut scheduler = PassScheduler::for_config(&ctx.config);
    log::info!(
        "rewriting {} application classes with passes {:?}",
        program.application_classes().len(),
        scheduler.pass_names()
    );
    scheduler.run(program, &ctx)?;

    if ctx.config.verify {
        let violations = verify::verify_program(program, Some(&ctx.config));
        for violation in &violations {
            ctx.events
                .record(EventKind::VerificationFailed)
                .method(violation.method.clone())
                .message(violation.message.clone());
        }
        verify::check_violations(violations)?;
    }

    let report = RewriteReport::from_context(ctx, program);
    log::info!("{}", report.stats.summary());
    for (outcome, count) in &report.outcomes {
        log::debug!("{outcome}: {count} steps");
    }
    Ok(report)
}
