//! Bounded external-computation pipeline behind the Adem relations page.
//!
//! A query flows through four stages:
//!
//! - **[`core::validate`]**: whitelist check, no side effects.
//! - **[`io::runner`]**: runs the computation as a subprocess under a hard
//!   time budget (see [`io::process`]).
//! - **[`core::classifier`]**: turns the outcome into a [`ResultPayload`].
//! - **[`io::templates`]**: renders the payload with a startup-built
//!   template cache.
//!
//! [`pipeline::run_query`] wires the first three together.
//!
//! [`ResultPayload`]: core::types::ResultPayload

pub mod core;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
