//! Domain types for cohort registration.
//!
//! Identifiers, money, the catalog read models this service consumes
//! (cohorts and promo codes) and the records it owns (registrations and
//! waitlist entries).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(
    /// Learner or staff account, as known to the identity provider
    UserId
);
uuid_id!(
    /// One scheduled intake of a program
    CohortId
);
uuid_id!(
    /// A program in the catalog
    ProgramId
);
uuid_id!(
    /// One learner's registration for one cohort
    RegistrationId
);
uuid_id!(
    /// A queued learner for a full cohort
    WaitlistEntryId
);

/// Gateway-assigned payment reference
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(String);

impl PaymentId {
    /// Wrap a gateway reference
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Money
// ============================================================================

/// An amount in minor units of the platform currency (halalas for SAR)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero
    pub const ZERO: Self = Self(0);

    /// From minor units
    #[must_use]
    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// From major units, `None` on overflow
    #[must_use]
    pub const fn from_major(major: u64) -> Option<Self> {
        match major.checked_mul(100) {
            Some(minor) => Some(Self(minor)),
            None => None,
        }
    }

    /// Minor units
    #[must_use]
    pub const fn minor(&self) -> u64 {
        self.0
    }

    /// Subtract, stopping at zero
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Catalog read models
// ============================================================================

/// A scheduled offering of a program, as published by the catalog.
///
/// The catalog owns everything here. Seat counts (`enrolled`, held) live in
/// the cohort's seat ledger, which this service owns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cohort {
    /// Cohort id
    pub id: CohortId,
    /// Program this cohort runs
    pub program_id: ProgramId,
    /// Seats offered
    pub capacity: u32,
    /// Registration opens (inclusive)
    pub registration_opens_at: DateTime<Utc>,
    /// Registration closes (exclusive)
    pub registration_closes_at: DateTime<Utc>,
    /// Program price before discounts
    pub price: Money,
}

impl Cohort {
    /// Whether registration is open at `now`
    #[must_use]
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.registration_opens_at <= now && now < self.registration_closes_at
    }
}

/// How a promo code reduces the price
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscountRule {
    /// Percentage off, 0 to 100
    Percentage {
        /// Percent off
        percent: u8,
    },
    /// Fixed amount off, never below zero
    Fixed {
        /// Amount off
        amount: Money,
    },
}

/// Promo code reference data, read-only here
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCode {
    /// Normalized code (trimmed, upper case)
    pub code: String,
    /// Discount
    pub rule: DiscountRule,
    /// First instant the code is valid
    pub valid_from: DateTime<Utc>,
    /// Instant the code stops being valid; `None` never expires
    pub valid_until: Option<DateTime<Utc>>,
    /// Total redemptions allowed
    pub max_uses: Option<u32>,
    /// Redemptions allowed per learner
    pub max_uses_per_user: Option<u32>,
    /// Cohorts the code applies to; empty means any
    #[serde(default)]
    pub cohort_ids: Vec<CohortId>,
    /// Programs the code applies to; empty means any
    #[serde(default)]
    pub program_ids: Vec<ProgramId>,
}

/// Current redemptions of a promo code
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PromoUsage {
    /// Across all learners
    pub total: u32,
    /// By the learner asking
    pub by_user: u32,
}

/// A validated discount applied to a cohort price
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    /// Code that produced it
    pub code: String,
    /// Amount taken off
    pub amount_off: Money,
    /// Price after the discount
    pub final_price: Money,
}

// ============================================================================
// Registrations
// ============================================================================

/// Registration lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationStatus {
    /// Seat held, payment outstanding
    PendingPayment,
    /// Paid; the seat is consumed
    Confirmed,
    /// Cancelled by the learner or an admin
    Cancelled,
    /// Hold lapsed without payment
    Expired,
    /// Queued on the waitlist; holds no seat
    Waitlisted,
}

impl RegistrationStatus {
    /// Active registrations block a second registration for the same cohort
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::PendingPayment | Self::Confirmed | Self::Waitlisted)
    }

    /// Storage / wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingPayment => "PENDING_PAYMENT",
            Self::Confirmed => "CONFIRMED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
            Self::Waitlisted => "WAITLISTED",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_PAYMENT" => Ok(Self::PendingPayment),
            "CONFIRMED" => Ok(Self::Confirmed),
            "CANCELLED" => Ok(Self::Cancelled),
            "EXPIRED" => Ok(Self::Expired),
            "WAITLISTED" => Ok(Self::Waitlisted),
            other => Err(format!("unknown registration status '{other}'")),
        }
    }
}

/// One learner's relationship to one cohort. Never deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Registration id
    pub id: RegistrationId,
    /// Learner
    pub user_id: UserId,
    /// Cohort
    pub cohort_id: CohortId,
    /// Lifecycle state
    pub status: RegistrationStatus,
    /// Created
    pub registered_at: DateTime<Utc>,
    /// Set on confirmation
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Hold deadline; set only while `PENDING_PAYMENT`
    pub expires_at: Option<DateTime<Utc>>,
    /// Set on cancellation or expiry
    pub closed_at: Option<DateTime<Utc>>,
    /// Applied promo code
    pub promo_code: Option<String>,
    /// Price after discount
    pub price: Money,
    /// Gateway payment attached to this registration
    pub payment_id: Option<PaymentId>,
    /// Why it was cancelled
    pub cancellation_reason: Option<String>,
}

// ============================================================================
// Waitlist
// ============================================================================

/// Waitlist entry state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaitlistStatus {
    /// Queued
    Waiting,
    /// Offered a seat, awaiting payment
    Notified,
    /// Offer lapsed
    Expired,
    /// Learner paid for the offered seat
    Converted,
    /// Learner left the queue or cancelled
    Left,
}

impl WaitlistStatus {
    /// Active entries hold a queue position
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Waiting | Self::Notified)
    }

    /// Storage / wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Notified => "NOTIFIED",
            Self::Expired => "EXPIRED",
            Self::Converted => "CONVERTED",
            Self::Left => "LEFT",
        }
    }
}

impl fmt::Display for WaitlistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WaitlistStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAITING" => Ok(Self::Waiting),
            "NOTIFIED" => Ok(Self::Notified),
            "EXPIRED" => Ok(Self::Expired),
            "CONVERTED" => Ok(Self::Converted),
            "LEFT" => Ok(Self::Left),
            other => Err(format!("unknown waitlist status '{other}'")),
        }
    }
}

/// A queued learner. `position` is 1-based and dense over active entries;
/// terminal entries keep the position they last held.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    /// Entry id
    pub id: WaitlistEntryId,
    /// Learner
    pub user_id: UserId,
    /// Cohort
    pub cohort_id: CohortId,
    /// The `WAITLISTED` registration this entry stands for
    pub registration_id: RegistrationId,
    /// Queue position
    pub position: u32,
    /// State
    pub status: WaitlistStatus,
    /// Joined
    pub joined_at: DateTime<Utc>,
    /// Offered a seat
    pub notified_at: Option<DateTime<Utc>>,
    /// Offer deadline
    pub expires_at: Option<DateTime<Utc>>,
}
