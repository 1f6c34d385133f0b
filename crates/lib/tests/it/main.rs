/*! Integration tests for positioning.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - config: declarations and scope resolution
 * - mechanism: renumbering on create, update and destroy, relative requests
 * - transaction: the record lifecycle and scope locking
 * - instance: autocommit helpers, verification and healing
 * - backend: store specific behavior (in-memory persistence, SQLite files)
 *
 * Set TEST_BACKEND=inmemory|sqlite|postgres to run the backend-agnostic
 * tests against a particular store.
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("positioning=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod helpers;
