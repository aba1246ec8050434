//! Compliance Submission Queue
//!
//! 已签名记录异步申报到税务局，失败按指数退避重试，
//! 超过上限或被拒收的记录转为合规错误，由人工关闭。

mod client;
mod error;
mod payload;
mod policy;
mod queue;
mod worker;

pub use client::{
    AuthorityRequest, AuthorityResponse, ClientError, HttpTaxAuthorityClient, TaxAuthorityClient,
};
pub use error::{SubmissionError, SubmissionResult};
pub use payload::SubmissionPayload;
pub use policy::{FailureDecision, RetryPolicy, classify_status};
pub use queue::{ClaimedBatch, SubmissionQueue};
pub use worker::SubmissionWorker;
