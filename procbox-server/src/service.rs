//! gRPC facade over the sandbox catalog.
//!
//! Every method authenticates the peer through its single client
//! certificate and role-checks the target command before touching the
//! sandbox. All authentication and authorization failures collapse into
//! one opaque response so callers cannot probe which step rejected them;
//! the true cause is logged here and nowhere else.

use procbox::{ProcessId, Sandbox};
use procbox_shared::roles::{self, RoleTable};
use procbox_shared::tls::{self, PeerIdentity};
use procbox_shared::{Command, CommandOutput, CommandService, Process, ProcessStatus, SandboxError};
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

/// Output is streamed in frames of at most this many bytes.
const OUTPUT_FRAME: usize = 1024;

pub struct CommandServer {
    sandbox: Arc<Sandbox>,
    roles: RoleTable,
}

impl CommandServer {
    pub fn new(sandbox: Arc<Sandbox>, roles: RoleTable) -> Self {
        Self { sandbox, roles }
    }

    /// Extract the single verified client certificate from the request.
    /// Exactly one certificate is accepted; negotiating roles across
    /// several is not supported.
    fn peer_identity<T>(&self, request: &Request<T>) -> Result<PeerIdentity, Status> {
        let Some(certs) = request.peer_certs() else {
            warn!("peer presented no client certificate");
            return Err(auth_failure());
        };

        if certs.len() != 1 {
            warn!(count = certs.len(), "unexpected peer certificate count");
            return Err(auth_failure());
        }

        tls::peer_identity(certs[0].as_ref()).map_err(|err| {
            warn!(error = %err, "failed to parse peer certificate");
            auth_failure()
        })
    }

    fn role_check(&self, identity: &PeerIdentity, command: &str) -> Result<(), Status> {
        let commands = roles::allowed_commands(&self.roles, &identity.orgs, &identity.units);

        if !roles::is_allowed(&commands, command) {
            warn!(
                serial = %identity.serial,
                command,
                "role check rejected command"
            );
            return Err(auth_failure());
        }

        Ok(())
    }

    /// Stat the process to recover its stored command, then role-check
    /// the peer against it. An unknown id collapses into the opaque
    /// failure: without the command there is nothing to authorize.
    async fn role_check_by_id<T>(
        &self,
        request: &Request<T>,
        id: ProcessId,
    ) -> Result<PeerIdentity, Status> {
        let status = self.sandbox.stat(id).await.map_err(|err| {
            warn!(%id, error = %err, "stat failed during role check");
            auth_failure()
        })?;

        let identity = self.peer_identity(request)?;
        self.role_check(&identity, &status.command)?;

        Ok(identity)
    }
}

#[tonic::async_trait]
impl CommandService for CommandServer {
    /// Verifies the roles embedded in the certificate and starts the
    /// process.
    async fn start(&self, request: Request<Command>) -> Result<Response<Process>, Status> {
        let identity = self.peer_identity(&request)?;
        let req = request.into_inner();

        self.role_check(&identity, &req.command)?;

        let id = self
            .sandbox
            .start(&req.command, &req.args)
            .await
            .map_err(|err| {
                warn!(serial = %identity.serial, error = %err, "failed to start process");
                sandbox_status(err)
            })?;

        info!(
            serial = %identity.serial,
            command = %req.command,
            args = ?req.args,
            %id,
            "started command"
        );

        Ok(Response::new(Process { id: id.to_string() }))
    }

    /// Requests termination and reports the resulting status.
    async fn stop(&self, request: Request<Process>) -> Result<Response<ProcessStatus>, Status> {
        let id = parse_id(&request.get_ref().id)?;
        let identity = self.role_check_by_id(&request, id).await?;

        self.sandbox.stop(id).await.map_err(|err| {
            warn!(serial = %identity.serial, %id, error = %err, "failed to stop process");
            sandbox_status(err)
        })?;

        info!(serial = %identity.serial, %id, "stopping process");

        let status = self.sandbox.stat(id).await.map_err(sandbox_status)?;
        Ok(Response::new(to_wire_status(&status)))
    }

    /// Returns the status of the command.
    async fn stat(&self, request: Request<Process>) -> Result<Response<ProcessStatus>, Status> {
        // Existence first, authentication second: kept as the wire
        // contract this service has always had.
        let id = request
            .get_ref()
            .id
            .parse::<ProcessId>()
            .map_err(|_| Status::not_found(SandboxError::ProcessNotFound.to_string()))?;
        let status = self
            .sandbox
            .stat(id)
            .await
            .map_err(|_| Status::not_found(SandboxError::ProcessNotFound.to_string()))?;

        let identity = self.peer_identity(&request)?;
        self.role_check(&identity, &status.command)?;

        info!(serial = %identity.serial, %id, "stat process");

        Ok(Response::new(to_wire_status(&status)))
    }

    type OutputStream = ReceiverStream<Result<CommandOutput, Status>>;

    /// Streams the merged stdout/stderr of the process to the client.
    async fn output(
        &self,
        request: Request<Process>,
    ) -> Result<Response<Self::OutputStream>, Status> {
        let id = parse_id(&request.get_ref().id)?;
        let identity = self.role_check_by_id(&request, id).await?;

        let mut reader = self.sandbox.output(id).await.map_err(|err| {
            warn!(serial = %identity.serial, %id, error = %err, "failed to open output");
            sandbox_status(err)
        })?;

        info!(serial = %identity.serial, %id, "streaming output");

        let (tx, rx) = tokio::sync::mpsc::channel(16);
        tokio::spawn(async move {
            let mut buf = [0u8; OUTPUT_FRAME];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        let frame = CommandOutput {
                            data: buf[..n].to_vec(),
                        };
                        // a dropped receiver means the client went away
                        if tx.send(Ok(frame)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(%id, error = %err, "error reading output");
                        let _ = tx.send(Err(Status::internal(err.to_string()))).await;
                        break;
                    }
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

/// The single opaque response for every authentication or authorization
/// failure.
fn auth_failure() -> Status {
    Status::unauthenticated(SandboxError::Auth.to_string())
}

/// A token that does not parse cannot name a process; treated exactly
/// like an unknown id on the stop/output paths.
fn parse_id(token: &str) -> Result<ProcessId, Status> {
    token.parse::<ProcessId>().map_err(|_| {
        warn!(token, "unparseable process id");
        auth_failure()
    })
}

fn sandbox_status(err: SandboxError) -> Status {
    match err {
        SandboxError::ProcessNotFound => Status::not_found(err.to_string()),
        SandboxError::Cancelled => Status::cancelled(err.to_string()),
        SandboxError::Auth => auth_failure(),
        other => Status::internal(other.to_string()),
    }
}

fn to_wire_status(status: &procbox::Status) -> ProcessStatus {
    ProcessStatus {
        exited: status.exited,
        exit_code: status.exit_code,
    }
}
