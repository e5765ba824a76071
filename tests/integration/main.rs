//! Integration tests for the realtime connectivity core.

mod helpers;

mod hub_test;
mod presence_test;
mod registry_test;
mod supervisor_test;
