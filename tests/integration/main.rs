//! End-to-end tests driving a real broadcast server with real clients.

mod collab_ws_test;
mod helpers;
