//! End-to-end tests for the Tether workspace live under `tests/`.
