//! Availability resolution and atomic slot booking for a tele-health portal.
//!
//! Practitioners publish recurring weekly availability; `calendar` expands it
//! into concrete slots, `reconcile` removes the ones already booked, and
//! `booking` charges and persists a chosen slot as one unit.

pub mod availability;
pub mod booking;
pub mod calendar;
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod pricing;
pub mod reconcile;
pub mod store;
pub mod telemetry;

pub use availability::AvailabilityService;
pub use booking::{BookingCoordinator, BookingReceipt, BookingRequest};
pub use error::{BookingError, BookingErrorKind, GatewayError, StoreError, ValidationError};
pub use gateway::{Authorization, PaymentDetails, PaymentGateway, SandboxGateway};
pub use reconcile::SlotPartition;
pub use store::{AvailabilityStore, InMemoryAvailabilityStore, InMemorySessionStore, SessionStore};
