//! Simulated remote node for testing sessions without hardware.
//!
//! The fake node sits on the far end of an in-memory duplex pipe, parses
//! incoming command frames with the same [`LinkReader`] as the host, and
//! answers each one according to a reply policy.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, WriteHalf};
use tokio::task::JoinHandle;

use crate::frame::encoder::encode_ack;
use crate::frame::protocol::{Ack, Frame, STATUS_OK};
use crate::link::LinkReader;

/// What the fake node does with a received frame
#[derive(Debug, Clone)]
pub enum Reply {
    /// Do not answer
    Silent,
    /// Acknowledge the received opcode with a status
    Ack(u8),
    /// Acknowledge after a delay
    AckAfter(Duration, u8),
    /// Write arbitrary bytes
    Raw(Vec<u8>),
}

type Policy = Box<dyn Fn(&Frame) -> Reply + Send + Sync>;
type SharedWriter = Arc<tokio::sync::Mutex<WriteHalf<DuplexStream>>>;

/// Mock node on the far end of a duplex pipe
pub struct FakeNode {
    received: Arc<Mutex<Vec<Frame>>>,
    writer: SharedWriter,
    task: JoinHandle<()>,
}

impl FakeNode {
    /// Spawn a fake node answering with `policy`
    ///
    /// # Returns
    ///
    /// * The host end of the pipe (hand it to a session) and the node handle
    pub fn spawn<F>(policy: F) -> (DuplexStream, FakeNode)
    where
        F: Fn(&Frame) -> Reply + Send + Sync + 'static,
    {
        let (host, node) = tokio::io::duplex(1024);
        let (mut reader, writer) = tokio::io::split(node);

        let received = Arc::new(Mutex::new(Vec::new()));
        let writer: SharedWriter = Arc::new(tokio::sync::Mutex::new(writer));
        let policy: Policy = Box::new(policy);

        let task = {
            let received = received.clone();
            let writer = writer.clone();
            tokio::spawn(async move {
                let mut link = LinkReader::new();
                let mut buf = [0u8; 64];

                loop {
                    let n = match reader.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };

                    for frame in link.push(&buf[..n]) {
                        received.lock().unwrap().push(frame.clone());
                        Self::answer(&writer, &frame, policy(&frame)).await;
                    }
                }
            })
        };

        (host, FakeNode { received, writer, task })
    }

    /// Node acknowledging every command with OK
    pub fn acking() -> (DuplexStream, FakeNode) {
        Self::spawn(|_| Reply::Ack(STATUS_OK))
    }

    /// Node that never answers
    pub fn silent() -> (DuplexStream, FakeNode) {
        Self::spawn(|_| Reply::Silent)
    }

    async fn answer(writer: &SharedWriter, frame: &Frame, reply: Reply) {
        let ack = |status| encode_ack(&Ack { opcode: frame.frame_type, status });

        match reply {
            Reply::Silent => {}
            Reply::Ack(status) => {
                let _ = writer.lock().await.write_all(&ack(status)).await;
            }
            Reply::AckAfter(delay, status) => {
                let writer = writer.clone();
                let bytes = ack(status);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = writer.lock().await.write_all(&bytes).await;
                });
            }
            Reply::Raw(bytes) => {
                let _ = writer.lock().await.write_all(&bytes).await;
            }
        }
    }

    /// Frames received so far, in order
    pub fn received(&self) -> Vec<Frame> {
        self.received.lock().unwrap().clone()
    }

    /// Write unsolicited bytes towards the host (telemetry, boot, noise)
    pub async fn inject(&self, bytes: &[u8]) {
        self.writer.lock().await.write_all(bytes).await.unwrap();
    }
}

impl Drop for FakeNode {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encoder::encode_command;
    use crate::frame::protocol::Command;

    #[tokio::test]
    async fn test_fake_node_acks_commands() {
        let (mut host, node) = FakeNode::acking();

        host.write_all(&encode_command(&Command::settxpow(0x50))).await.unwrap();

        let mut reply = [0u8; 5];
        host.read_exact(&mut reply).await.unwrap();

        assert_eq!(reply.to_vec(), encode_ack(&Ack { opcode: 0xC7, status: STATUS_OK }));
        assert_eq!(node.received(), vec![Frame::from(&Command::settxpow(0x50))]);
    }
}
