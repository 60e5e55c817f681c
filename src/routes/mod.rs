/// Router Module Index
///
/// Routing is split by access rule so the right guard is applied at the module level
/// rather than inside each handler.

/// Routes accessible to all callers: health, registration, sign-in and locale.
pub mod public;

/// JSON API routes protected by the `AuthUser` extractor middleware.
pub mod authenticated;

/// Browser page routes behind the session guard.
pub mod pages;
