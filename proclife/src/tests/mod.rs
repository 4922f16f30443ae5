//! Lifecycle Scenario Tests
//!
//! End-to-end tests of fork, exec, exit and waitpid against fake
//! collaborators. Concurrency scenarios run processes on host threads.
