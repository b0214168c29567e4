//! # Shizuku Broker Testkit
//!
//! Fake collaborators and fixtures for exercising the broker without a
//! platform: an in-memory package database, a manually driven consent
//! dialog, a recording event sink, killable liveness handles, and a
//! pre-wired broker over a temporary store directory.

pub mod fakes;
pub mod fixtures;

pub use fakes::{
    FakeLivenessHandle, FakePackageDatabase, ManualConsentUi, RecordingEventSink, StaticAuthority,
};
pub use fixtures::{BrokerFixture, CallbackOutcome, CollectingCallback};
