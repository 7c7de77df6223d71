//! Fallback cascades: an ordered chain of degrading strategies
//!
//! ```text
//!   primary ──retry executor──▶ ok? ─▶ value
//!      │ error
//!      ▼
//!   fallback 1 ─once─▶ ok? ─▶ value (+ fallback report)
//!      │ error
//!      ▼
//!   fallback N ─once─▶ ok? ─▶ value (+ fallback report)
//!      │ error
//!      ▼
//!   CascadeFailure (caller substitutes a placeholder)
//! ```

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::DriverError;
use crate::handler::ResilienceHandler;
use crate::model::{ErrorContext, Resolution, RetryConfig};
use crate::page::Page;

/// Static description of a tier, used in logs and results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierDescriptor {
    pub name: &'static str,
    /// Output fidelity, 100 = lossless full quality
    pub quality: u8,
    /// Relative cost compared to the other tiers of the same cascade
    pub cost: u8,
}

impl TierDescriptor {
    pub const fn new(name: &'static str, quality: u8, cost: u8) -> Self {
        Self {
            name,
            quality,
            cost,
        }
    }
}

/// One strategy of a cascade
#[async_trait]
pub trait Tier: Send + Sync {
    type Output: Send;

    fn descriptor(&self) -> TierDescriptor;

    async fn attempt(&self, page: &dyn Page) -> Result<Self::Output, DriverError>;
}

/// Value produced by a cascade together with the tier that produced it
#[derive(Debug, Clone)]
pub struct CascadeSuccess<T> {
    pub value: T,
    /// 0 for the primary tier
    pub tier: usize,
    pub descriptor: TierDescriptor,
}

/// Every tier failed
#[derive(Debug, Clone)]
pub struct CascadeFailure {
    /// Error of the last tier tried
    pub error: DriverError,
    /// Number of tiers tried
    pub tiers_attempted: usize,
}

type BoxedTier<'t, T> = Box<dyn Tier<Output = T> + 't>;

/// Tiers tried once each, in order, after the primary has failed
pub struct Fallbacks<'t, T> {
    tiers: Vec<BoxedTier<'t, T>>,
}

impl<'t, T: Send> Fallbacks<'t, T> {
    pub fn new() -> Self {
        Self { tiers: Vec::new() }
    }

    pub fn tier(mut self, tier: impl Tier<Output = T> + 't) -> Self {
        self.tiers.push(Box::new(tier));
        self
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn descriptors(&self) -> Vec<TierDescriptor> {
        self.tiers.iter().map(|t| t.descriptor()).collect()
    }

    /// Try each fallback once. `trigger` is the error that sent the operation
    /// here; a success logs a `fallback` recovery from it.
    ///
    /// Returned tier indexes count the primary as 0.
    pub async fn run<C: Clock>(
        &self,
        handler: &mut ResilienceHandler<C>,
        context: &ErrorContext,
        page: &dyn Page,
        trigger: DriverError,
    ) -> Result<CascadeSuccess<T>, CascadeFailure> {
        let mut last_error = trigger.clone();

        for (index, tier) in self.tiers.iter().enumerate() {
            let descriptor = tier.descriptor();
            let position = index + 1;
            info!(
                "{}: trying fallback {} '{}' for {}/{}",
                context.operation, position, descriptor.name, context.target.page, context.target.theme
            );

            match tier.attempt(page).await {
                Ok(value) => {
                    let fallback_context =
                        context.for_attempt(position as u32 + 1, handler.clock().now());
                    handler.log_recovery(&fallback_context, &trigger, Resolution::Fallback, true);
                    return Ok(CascadeSuccess {
                        value,
                        tier: position,
                        descriptor,
                    });
                }
                Err(e) => {
                    warn!(
                        "{}: fallback '{}' failed: {}",
                        context.operation, descriptor.name, e
                    );
                    last_error = e;
                }
            }
        }

        Err(CascadeFailure {
            error: last_error,
            tiers_attempted: self.tiers.len() + 1,
        })
    }
}

impl<'t, T: Send> Default for Fallbacks<'t, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A primary tier run through the retry executor, backed by fallbacks
pub struct Cascade<'t, T> {
    primary: BoxedTier<'t, T>,
    fallbacks: Fallbacks<'t, T>,
    retry: Option<RetryConfig>,
}

impl<'t, T: Send> Cascade<'t, T> {
    pub fn new(primary: impl Tier<Output = T> + 't) -> Self {
        Self {
            primary: Box::new(primary),
            fallbacks: Fallbacks::new(),
            retry: None,
        }
    }

    pub fn fallback(mut self, tier: impl Tier<Output = T> + 't) -> Self {
        self.fallbacks = self.fallbacks.tier(tier);
        self
    }

    /// Retry policy for the primary tier; the handler default otherwise
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn descriptors(&self) -> Vec<TierDescriptor> {
        let mut all = vec![self.primary.descriptor()];
        all.extend(self.fallbacks.descriptors());
        all
    }

    pub async fn run<C: Clock>(
        &self,
        handler: &mut ResilienceHandler<C>,
        context: &ErrorContext,
        page: &dyn Page,
    ) -> Result<CascadeSuccess<T>, CascadeFailure> {
        let primary = &self.primary;
        let outcome = handler
            .execute_with_retry(context, self.retry.as_ref(), || primary.attempt(page))
            .await;

        match outcome {
            Ok(value) => Ok(CascadeSuccess {
                value,
                tier: 0,
                descriptor: primary.descriptor(),
            }),
            Err(e) => {
                warn!(
                    "{}: primary '{}' failed, falling back: {}",
                    context.operation,
                    primary.descriptor().name,
                    e
                );
                self.fallbacks
                    .run(handler, context, page, e.into_driver_error())
                    .await
            }
        }
    }
}
