//! Integration tests: full sessions against an in-memory venue.

mod mock_venue;
mod session_flow;
