//! gRPC service implementation for the `NextId` RPC.

use std::sync::Arc;

use leaseflake::Composer;
use leaseflake_proto::Error;
use leaseflake_proto::proto::{NextIdRequest, NextIdResponse, id_generator_server::IdGenerator};
use portable_atomic::{AtomicBool, Ordering};
use tonic::{Request, Response, Status};

use crate::server::telemetry::{increment_errors, increment_ids_generated, increment_requests};

// Set once a shutdown has been initiated, so in-flight and new requests can
// be refused cleanly rather than racing the composer's teardown.
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

pub fn set_global_shutdown() {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

fn is_shutting_down() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

/// The concrete implementation of the [`IdGenerator`] gRPC service.
///
/// Thin by design: the actual id-generation logic lives in
/// [`leaseflake::Composer`], which already handles its own synchronization.
/// This type exists to adapt that synchronous, blocking call to tonic's
/// async `Request`/`Response` shape and to map errors onto `Status`.
#[derive(Clone)]
pub struct IdService {
    composer: Arc<Composer>,
}

impl IdService {
    pub fn new(composer: Arc<Composer>) -> Self {
        Self { composer }
    }
}

#[tonic::async_trait]
impl IdGenerator for IdService {
    /// Generates the next id.
    ///
    /// `Composer::next_id` is synchronous and only ever blocks briefly (for
    /// a sequence wraparound or a small clock regression), so it is safe to
    /// call directly from the async handler rather than via
    /// `spawn_blocking`. A panic inside it - which should never happen, but
    /// composer invariants are easy to get subtly wrong - is caught so one
    /// bad request cannot take down the whole connection's executor thread.
    #[tracing::instrument(skip_all)]
    async fn next_id(
        &self,
        _req: Request<NextIdRequest>,
    ) -> Result<Response<NextIdResponse>, Status> {
        if is_shutting_down() {
            increment_errors();
            return Err(Error::ServiceShutdown.into());
        }

        increment_requests();
        let composer = Arc::clone(&self.composer);
        let result =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| composer.next_id()));

        match result {
            Ok(Ok(id)) => {
                increment_ids_generated();
                Ok(Response::new(NextIdResponse { id: id as u64 }))
            }
            Ok(Err(err)) => {
                increment_errors();
                Err(Error::Core(err).into())
            }
            Err(_) => {
                increment_errors();
                Err(Status::internal("id composer panicked"))
            }
        }
    }
}
