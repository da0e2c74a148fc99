//! Pass trait for the rewrite pipeline.
//!
//! This module defines the [`RewritePass`] trait that all rewrite passes implement, plus the
//! shared filter deciding which methods are eligible for rewriting at all.

use crate::{
    ir::{Body, MethodId, Program},
    rewrite::RewriteContext,
    Result,
};

/// A rewrite pass over method bodies.
///
/// All passes must be thread-safe (Send + Sync) to allow parallel execution.
/// Passes receive mutable access to one method body and shared access to the
/// program and the rewrite context.
///
/// # Body ownership
///
/// The scheduler moves each body out of the [`Program`] before calling
/// [`RewritePass::run_on_method`] and moves it back afterwards, so the body passed in is not
/// visible through the program while the pass runs. Passes may freely query and extend the
/// program (add classes, fields, methods, change signatures) during the call.
pub trait RewritePass: Send + Sync {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Should this pass run on a specific method?
    ///
    /// Called before `run_on_method`. The default accepts every method that
    /// [`is_rewritable`] accepts.
    fn should_run(&self, method: &MethodId, program: &Program, ctx: &RewriteContext) -> bool {
        is_rewritable(method, program, ctx)
    }

    /// Run the pass on a single method body.
    ///
    /// Returns `true` if any changes were made, `false` otherwise.
    /// Events should be recorded directly to `ctx.events`.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is malformed in a way the pass cannot handle.
    fn run_on_method(
        &self,
        method: &MethodId,
        body: &mut Body,
        program: &Program,
        ctx: &RewriteContext,
    ) -> Result<bool>;

    /// Run on the entire program (for whole-program passes).
    ///
    /// # Errors
    ///
    /// Returns an error if the pass fails to process the program.
    fn run_global(&self, _program: &Program, _ctx: &RewriteContext) -> Result<bool> {
        Ok(false)
    }

    /// Does this pass operate globally (across all classes)?
    ///
    /// Global passes have their `run_global` called instead of
    /// iterating over methods with `run_on_method`.
    fn is_global(&self) -> bool {
        false
    }

    /// Called once before the pass runs.
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails.
    fn initialize(&mut self, _ctx: &RewriteContext) -> Result<()> {
        Ok(())
    }

    /// Called once after the pass completes.
    ///
    /// # Errors
    ///
    /// Returns an error if finalization fails.
    fn finalize(&mut self, _ctx: &RewriteContext) -> Result<()> {
        Ok(())
    }

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}

/// Returns `true` if `class` is an application class the rewriter may change: registered as
/// application code, outside every excluded package, and not synthesized by the rewriter.
#[must_use]
pub fn is_rewritable_class(class: &str, program: &Program, ctx: &RewriteContext) -> bool {
    if ctx.config.is_excluded(class) || ctx.counters.is_counter_class(class) || ctx.is_wrapper(class)
    {
        return false;
    }
    program
        .with_class(class, |c| c.is_application() && !c.is_synthetic())
        .unwrap_or(false)
}

/// Returns `true` if a method's body may be rewritten: its class is rewritable and the method
/// itself was not synthesized by the rewriter.
#[must_use]
pub fn is_rewritable(method: &MethodId, program: &Program, ctx: &RewriteContext) -> bool {
    if !is_rewritable_class(&method.class, program, ctx) {
        return false;
    }
    match program.method(method) {
        Some(m) => {
            !m.is_synthetic() && !ctx.is_generated(&format!("{}.{}", method.class, m.name))
        }
        None => false,
    }
}

/// `Class.method` form of a method id, for events and log lines.
#[must_use]
pub fn qualified_name(method: &MethodId, program: &Program) -> String {
    program
        .method_ref(method)
        .map_or_else(|| method.to_string(), |m| m.qualified_name())
}
