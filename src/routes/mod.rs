/// Router Module Index
///
/// Routes are grouped by access level and mounted under the API prefix by `create_router`.
/// Optional areas (community, AI readiness) are only registered when their feature flag
/// is on, so a disabled area answers like any unknown path.

/// Routes open to anonymous callers. Handlers only expose public or active records.
pub mod public;

/// Routes behind the `AuthUser` middleware. Handlers that need more (an active account, an
/// admin role) check it themselves.
pub mod authenticated;

/// The `/admin` area. Every route passes the admin role check before the handler runs.
pub mod admin;
