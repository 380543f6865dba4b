use crate::policy::Directive;
use anyhow::Result;
use async_trait::async_trait;
use dockloc_common::link::{LinkMessage, MotionCommand};
use std::{net::SocketAddr, time::Duration};
use tokio::net::UdpSocket;

/// Fixed magnitudes (percent) for each directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotionProfile {
    pub translation: i8,
    pub rotation: i8,
    pub ascend: i8,
    pub duration: Duration,
}

impl Default for MotionProfile {
    fn default() -> Self {
        Self {
            translation: 10,
            rotation: 10,
            ascend: 5,
            duration: Duration::from_millis(100),
        }
    }
}

impl MotionProfile {
    pub fn command(&self, directive: Directive) -> MotionCommand {
        let mut c = MotionCommand::hover(self.duration);
        let (t, r) = (self.translation, self.rotation);

        match directive {
            Directive::RotateLeft => c.yaw = -r,
            Directive::RotateRight => c.yaw = r,
            Directive::MoveLeft => c.roll = -t,
            Directive::MoveRight => c.roll = t,
            Directive::MoveBackward => c.pitch = -t,
            Directive::MoveForward => c.pitch = t,
            Directive::Ascend => c.vertical = self.ascend,
            Directive::Hold => (),
        }

        c
    }
}

#[async_trait]
pub trait CommandLink: Send {
    async fn send(&mut self, command: MotionCommand) -> Result<()>;
    async fn actuate_payload(&mut self) -> Result<()>;

    /// Hands control back to the vehicle once the loop is done with it.
    async fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Datagram link to the vehicle.
///
/// Each `Fly` is paced: `send` returns once the command's duration elapsed.
pub struct UdpLink {
    socket: UdpSocket,
    pace: bool,
}

impl UdpLink {
    pub async fn connect(vehicle: SocketAddr) -> Result<Self> {
        let local: SocketAddr = if vehicle.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local).await?;
        socket.connect(vehicle).await?;

        Ok(Self { socket, pace: true })
    }

    pub fn with_pacing(mut self, v: bool) -> Self {
        self.pace = v;
        self
    }

    async fn send_message(&self, m: LinkMessage) -> Result<()> {
        self.socket.send(&Into::<Vec<u8>>::into(m)).await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        self.send_message(LinkMessage::Ping).await
    }
}

#[async_trait]
impl CommandLink for UdpLink {
    async fn send(&mut self, command: MotionCommand) -> Result<()> {
        self.send_message(LinkMessage::Fly(command)).await?;

        if self.pace && !command.is_hover() {
            tokio::time::sleep(command.duration).await;
        }
        Ok(())
    }

    async fn actuate_payload(&mut self) -> Result<()> {
        self.send_message(LinkMessage::Payload).await
    }

    async fn release(&mut self) -> Result<()> {
        self.send_message(LinkMessage::Stop).await
    }
}

/// Dry run link, only logs.
#[derive(Debug, Default)]
pub struct LogLink;

#[async_trait]
impl CommandLink for LogLink {
    async fn send(&mut self, command: MotionCommand) -> Result<()> {
        log::info!("fly {command}");
        Ok(())
    }

    async fn actuate_payload(&mut self) -> Result<()> {
        log::info!("payload");
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        log::info!("stop");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_signs() {
        let p = MotionProfile::default();

        assert_eq!(p.command(Directive::RotateLeft).yaw, -10);
        assert_eq!(p.command(Directive::RotateRight).yaw, 10);
        assert_eq!(p.command(Directive::MoveLeft).roll, -10);
        assert_eq!(p.command(Directive::MoveRight).roll, 10);
        assert_eq!(p.command(Directive::MoveBackward).pitch, -10);
        assert_eq!(p.command(Directive::MoveForward).pitch, 10);
        assert_eq!(p.command(Directive::Ascend).vertical, 5);

        let hold = p.command(Directive::Hold);
        assert!(hold.is_hover());
        assert_eq!(hold.duration, Duration::from_millis(100));
    }

    #[test]
    fn each_directive_moves_one_axis() {
        let p = MotionProfile::default();

        for d in [
            Directive::RotateLeft,
            Directive::MoveLeft,
            Directive::MoveForward,
            Directive::Ascend,
        ] {
            let c = p.command(d);
            let moved = [c.roll, c.pitch, c.yaw, c.vertical]
                .into_iter()
                .filter(|v| *v != 0)
                .count();
            assert_eq!(moved, 1, "{d}");
        }
    }

    #[tokio::test]
    async fn udp_link_sends_codec_datagrams() {
        let vehicle = UdpSocket::bind(("127.0.0.1", 0)).await.unwrap();
        let mut link = UdpLink::connect(vehicle.local_addr().unwrap())
            .await
            .unwrap()
            .with_pacing(false);

        let cmd = MotionProfile::default().command(Directive::MoveRight);
        link.send(cmd).await.unwrap();
        link.actuate_payload().await.unwrap();
        link.release().await.unwrap();

        let mut buf = [0; 16];
        let len = vehicle.recv(&mut buf).await.unwrap();
        assert_eq!(
            LinkMessage::try_from(&buf[..len]),
            Ok(LinkMessage::Fly(cmd))
        );

        let len = vehicle.recv(&mut buf).await.unwrap();
        assert_eq!(LinkMessage::try_from(&buf[..len]), Ok(LinkMessage::Payload));

        let len = vehicle.recv(&mut buf).await.unwrap();
        assert_eq!(LinkMessage::try_from(&buf[..len]), Ok(LinkMessage::Stop));
    }
}
