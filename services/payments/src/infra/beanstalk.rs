//! beanstalkd work queue.
//!
//! Speaks the beanstalkd text protocol directly over a tokio stream. Only the
//! commands the pipeline needs are implemented: `use`, `watch`, `ignore`, `put`,
//! `reserve-with-timeout`, `delete`, `release`, and `bury`.
//!
//! Reservations belong to the connection that made them: if a consumer's
//! connection drops, beanstalkd returns its reserved jobs to the ready queue.
//! That is why every worker owns a `BeanstalkConsumer` while producers share one
//! `BeanstalkQueue`.

use std::io;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use payflow_domain::job::Job;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
    WriteHalf,
};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::repository::{JobConsumer, JobQueue};
use crate::domain::types::{BURY_PRIORITY, JOB_PRIORITY, JobHandle, ReservedJob};
use crate::error::PaymentServiceError;

const CRLF: &[u8] = b"\r\n";
const DEFAULT_TUBE: &str = "default";

#[derive(Debug, thiserror::Error)]
pub enum BeanstalkError {
    #[error("beanstalkd i/o: {0}")]
    Io(#[from] io::Error),
    #[error("beanstalkd rejected `{command}`: {response}")]
    Rejected {
        command: &'static str,
        response: String,
    },
}

fn rejected(command: &'static str, response: &str) -> BeanstalkError {
    BeanstalkError::Rejected {
        command,
        response: response.to_owned(),
    }
}

fn parse_field<T: FromStr>(
    word: Option<&str>,
    command: &'static str,
    line: &str,
) -> Result<T, BeanstalkError> {
    word.and_then(|w| w.parse().ok())
        .ok_or_else(|| rejected(command, line))
}

/// Reply to `reserve-with-timeout`.
#[derive(Debug, PartialEq, Eq)]
pub enum Reservation {
    Job { id: u64, body: Vec<u8> },
    /// Nothing became ready within the timeout.
    TimedOut,
    /// A job this session already holds is within a second of its time-to-run.
    /// beanstalkd answers this immediately, so retrying on the same session spins.
    DeadlineSoon,
}

/// A single beanstalkd protocol session.
pub struct BeanstalkConnection<S = TcpStream> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
}

impl BeanstalkConnection<TcpStream> {
    pub async fn connect(addr: &str) -> Result<Self, BeanstalkError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl<S: AsyncRead + AsyncWrite> BeanstalkConnection<S> {
    pub fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn send(&mut self, command: &str, body: Option<&[u8]>) -> Result<(), BeanstalkError> {
        let body_len = body.map_or(0, |b| b.len() + CRLF.len());
        let mut frame = Vec::with_capacity(command.len() + CRLF.len() + body_len);
        frame.extend_from_slice(command.as_bytes());
        frame.extend_from_slice(CRLF);
        if let Some(body) = body {
            frame.extend_from_slice(body);
            frame.extend_from_slice(CRLF);
        }
        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String, BeanstalkError> {
        let mut line = Vec::new();
        let read = self.reader.read_until(b'\n', &mut line).await?;
        if read == 0 || !line.ends_with(CRLF) {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("connection closed after {read} bytes of a response line"),
            )
            .into());
        }
        line.truncate(line.len() - CRLF.len());
        String::from_utf8(line).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
    }

    async fn read_body(&mut self, len: usize) -> Result<Vec<u8>, BeanstalkError> {
        let mut body = vec![0; len + CRLF.len()];
        self.reader.read_exact(&mut body).await?;
        if !body.ends_with(CRLF) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "job body not terminated by CRLF",
            )
            .into());
        }
        body.truncate(len);
        Ok(body)
    }

    async fn round_trip(
        &mut self,
        command: &str,
        body: Option<&[u8]>,
    ) -> Result<String, BeanstalkError> {
        self.send(command, body).await?;
        self.read_line().await
    }

    /// Select the tube subsequent `put`s go to.
    pub async fn use_tube(&mut self, tube: &str) -> Result<(), BeanstalkError> {
        let line = self.round_trip(&format!("use {tube}"), None).await?;
        match line.split_once(' ') {
            Some(("USING", _)) => Ok(()),
            _ => Err(rejected("use", &line)),
        }
    }

    /// Add a tube to the watch list. Returns how many tubes are watched.
    pub async fn watch(&mut self, tube: &str) -> Result<u32, BeanstalkError> {
        let line = self.round_trip(&format!("watch {tube}"), None).await?;
        let mut words = line.split_whitespace();
        match words.next() {
            Some("WATCHING") => parse_field(words.next(), "watch", &line),
            _ => Err(rejected("watch", &line)),
        }
    }

    /// Drop a tube from the watch list. The last watched tube cannot be ignored.
    pub async fn ignore(&mut self, tube: &str) -> Result<u32, BeanstalkError> {
        let line = self.round_trip(&format!("ignore {tube}"), None).await?;
        let mut words = line.split_whitespace();
        match words.next() {
            Some("WATCHING") => parse_field(words.next(), "ignore", &line),
            _ => Err(rejected("ignore", &line)),
        }
    }

    /// Insert a job. `ttr` is the visibility window of each reservation.
    pub async fn put(
        &mut self,
        priority: u32,
        delay: Duration,
        ttr: Duration,
        body: &[u8],
    ) -> Result<u64, BeanstalkError> {
        let command = format!(
            "put {priority} {} {} {}",
            delay.as_secs(),
            ttr.as_secs().max(1),
            body.len()
        );
        let line = self.round_trip(&command, Some(body)).await?;
        let mut words = line.split_whitespace();
        match words.next() {
            Some("INSERTED") => parse_field(words.next(), "put", &line),
            // BURIED here means the server ran out of memory growing its queue.
            _ => Err(rejected("put", &line)),
        }
    }

    /// Reserve a job from the watched tubes, waiting at most `timeout`.
    pub async fn reserve_with_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Reservation, BeanstalkError> {
        let command = format!("reserve-with-timeout {}", timeout.as_secs());
        let line = self.round_trip(&command, None).await?;
        let mut words = line.split_whitespace();
        match words.next() {
            Some("RESERVED") => {
                let id: u64 = parse_field(words.next(), "reserve-with-timeout", &line)?;
                let len: usize = parse_field(words.next(), "reserve-with-timeout", &line)?;
                let body = self.read_body(len).await?;
                Ok(Reservation::Job { id, body })
            }
            Some("TIMED_OUT") => Ok(Reservation::TimedOut),
            Some("DEADLINE_SOON") => Ok(Reservation::DeadlineSoon),
            _ => Err(rejected("reserve-with-timeout", &line)),
        }
    }

    pub async fn delete(&mut self, id: u64) -> Result<(), BeanstalkError> {
        let line = self.round_trip(&format!("delete {id}"), None).await?;
        match line.as_str() {
            "DELETED" => Ok(()),
            _ => Err(rejected("delete", &line)),
        }
    }

    /// Put a reserved job back into the ready queue after `delay`.
    pub async fn release(
        &mut self,
        id: u64,
        priority: u32,
        delay: Duration,
    ) -> Result<(), BeanstalkError> {
        let command = format!("release {id} {priority} {}", delay.as_secs());
        let line = self.round_trip(&command, None).await?;
        match line.as_str() {
            "RELEASED" => Ok(()),
            _ => Err(rejected("release", &line)),
        }
    }

    pub async fn bury(&mut self, id: u64, priority: u32) -> Result<(), BeanstalkError> {
        let line = self
            .round_trip(&format!("bury {id} {priority}"), None)
            .await?;
        match line.as_str() {
            "BURIED" => Ok(()),
            _ => Err(rejected("bury", &line)),
        }
    }
}

fn unavailable(e: BeanstalkError) -> PaymentServiceError {
    PaymentServiceError::QueueUnavailable(e.into())
}

async fn open_producer(addr: &str, tube: &str) -> Result<BeanstalkConnection, BeanstalkError> {
    let mut conn = BeanstalkConnection::connect(addr).await?;
    conn.use_tube(tube).await?;
    Ok(conn)
}

async fn open_consumer(addr: &str, tube: &str) -> Result<BeanstalkConnection, BeanstalkError> {
    let mut conn = BeanstalkConnection::connect(addr).await?;
    conn.watch(tube).await?;
    if tube != DEFAULT_TUBE {
        conn.ignore(DEFAULT_TUBE).await?;
    }
    Ok(conn)
}

/// Producer handle shared by every request task.
///
/// The mutex only keeps request/response pairs on the one TCP connection from
/// interleaving. After any failure the connection is dropped and the next
/// publish dials a fresh one.
#[derive(Clone)]
pub struct BeanstalkQueue {
    addr: Arc<str>,
    tube: Arc<str>,
    ttr: Duration,
    conn: Arc<Mutex<Option<BeanstalkConnection>>>,
}

impl BeanstalkQueue {
    pub async fn connect(addr: &str, tube: &str, ttr: Duration) -> Result<Self, BeanstalkError> {
        let conn = open_producer(addr, tube).await?;
        Ok(Self {
            addr: addr.into(),
            tube: tube.into(),
            ttr,
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }
}

impl JobQueue for BeanstalkQueue {
    async fn publish(&self, job: &Job) -> Result<(), PaymentServiceError> {
        let mut slot = self.conn.lock().await;
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => open_producer(&self.addr, &self.tube)
                .await
                .map_err(unavailable)?,
        };
        let broker_id = conn
            .put(JOB_PRIORITY, Duration::ZERO, self.ttr, &job.payload)
            .await
            .map_err(unavailable)?;
        *slot = Some(conn);
        debug!(payment_id = %job.id, job = broker_id, tube = %self.tube, "job published");
        Ok(())
    }
}

/// Consumer owned by exactly one worker.
pub struct BeanstalkConsumer {
    addr: String,
    tube: String,
    conn: Option<BeanstalkConnection>,
}

impl BeanstalkConsumer {
    pub async fn connect(addr: &str, tube: &str) -> Result<Self, BeanstalkError> {
        let conn = open_consumer(addr, tube).await?;
        Ok(Self {
            addr: addr.to_owned(),
            tube: tube.to_owned(),
            conn: Some(conn),
        })
    }

    fn on_failure(&mut self, e: BeanstalkError) -> PaymentServiceError {
        // An I/O failure leaves the session in an unknown state. Dropping it lets
        // beanstalkd release our reservations and the next reserve reconnects.
        if matches!(e, BeanstalkError::Io(_)) {
            self.conn = None;
        }
        unavailable(e)
    }

    fn connection_lost(handle: JobHandle) -> PaymentServiceError {
        PaymentServiceError::QueueUnavailable(anyhow::anyhow!(
            "connection lost before job {handle} was settled; the broker will redeliver it"
        ))
    }
}

impl JobConsumer for BeanstalkConsumer {
    async fn reserve(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<ReservedJob>, PaymentServiceError> {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                warn!(tube = %self.tube, "reconnecting to beanstalkd");
                open_consumer(&self.addr, &self.tube)
                    .await
                    .map_err(unavailable)?
            }
        };
        let reserved = conn
            .reserve_with_timeout(timeout)
            .await
            .map_err(unavailable)?;
        match reserved {
            Reservation::Job { id, body } => {
                self.conn = Some(conn);
                Ok(Some(ReservedJob {
                    handle: JobHandle(id),
                    payload: body,
                }))
            }
            Reservation::TimedOut => {
                self.conn = Some(conn);
                Ok(None)
            }
            Reservation::DeadlineSoon => {
                // Closing the session hands its reservations back to the ready
                // queue; the next reserve dials a fresh one.
                warn!(tube = %self.tube, "reservation about to lapse, dropping connection");
                drop(conn);
                Ok(None)
            }
        }
    }

    async fn acknowledge(&mut self, handle: JobHandle) -> Result<(), PaymentServiceError> {
        let result = match self.conn.as_mut() {
            Some(conn) => conn.delete(handle.0).await,
            None => return Err(Self::connection_lost(handle)),
        };
        result.map_err(|e| self.on_failure(e))
    }

    async fn release(
        &mut self,
        handle: JobHandle,
        delay: Duration,
    ) -> Result<(), PaymentServiceError> {
        let result = match self.conn.as_mut() {
            Some(conn) => conn.release(handle.0, JOB_PRIORITY, delay).await,
            None => return Err(Self::connection_lost(handle)),
        };
        result.map_err(|e| self.on_failure(e))
    }

    async fn fail_permanently(&mut self, handle: JobHandle) -> Result<(), PaymentServiceError> {
        let result = match self.conn.as_mut() {
            Some(conn) => conn.bury(handle.0, BURY_PRIORITY).await,
            None => return Err(Self::connection_lost(handle)),
        };
        result.map_err(|e| self.on_failure(e))
    }
}
