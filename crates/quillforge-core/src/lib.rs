//! Core types and utilities for the quillforge generation engine.
//!
//! This crate provides the foundational types used throughout the engine:
//!
//! - **Identifiers**: `UserId`, `TransactionId`, `RequestId`
//! - **Accounts**: `AccountBalance`, `PlanType`
//! - **Usage**: `MonthlyUsage`, month-key helpers
//! - **Reservations**: `Reservation`, `ReservationStatus`, `ToolKind`, `QualityTier`
//! - **Cost**: `CostTable`, the single credit-to-word ratio table
//! - **Documents**: `Section`, `DetectionScores`, `Severity`, `Document`, `FinalVerdict`
//!
//! # Credit unit
//!
//! **1 credit buys a fixed number of generated words, set per tool by [`CostTable`].**
//!
//! - Default essay rate: 1 credit = 3 words, so a 300-word essay reserves 100 credits
//! - Premium quality doubles the credit cost at the same word count
//! - Balances are stored as `i64` whole credits; fractional credits do not exist

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod cost;
pub mod error;
pub mod ids;
pub mod reservation;
pub mod section;
pub mod usage;
pub mod verdict;

pub use account::{AccountBalance, PlanType, PRO_PLAN_MONTHLY_CREDITS, STANDARD_PLAN_MONTHLY_CREDITS};
pub use cost::{CostTable, DEFAULT_FREE_MONTHLY_WORD_CAP, DEFAULT_SIGNUP_GRANT_CREDITS};
pub use error::{LedgerError, Result};
pub use ids::{IdError, RequestId, TransactionId, UserId};
pub use reservation::{QualityTier, Reservation, ReservationStatus, ToolKind};
pub use section::{DetectionScores, Section, SectionRole, Severity};
pub use usage::{current_month_key, month_key, MonthlyUsage};
pub use verdict::{Document, FinalVerdict};
