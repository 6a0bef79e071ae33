// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod executors;
pub mod ledger;
pub mod oracle;
pub mod rebalance;
pub mod scheduler;
pub mod selection;
pub mod submitter;

pub use ledger::{ActivityLedger, ActivityStats};
pub use scheduler::ActionScheduler;
pub use submitter::TransactionSubmitter;
