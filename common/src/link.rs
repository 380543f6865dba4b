use std::{fmt::Display, time::Duration};

/// A fixed-duration piloting command, magnitudes in percent of the vehicle's maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotionCommand {
    /// positive is right
    pub roll: i8,
    /// positive is forward
    pub pitch: i8,
    /// positive is clockwise
    pub yaw: i8,
    /// positive is up
    pub vertical: i8,
    pub duration: Duration,
}

impl MotionCommand {
    pub const fn hover(duration: Duration) -> Self {
        Self {
            roll: 0,
            pitch: 0,
            yaw: 0,
            vertical: 0,
            duration,
        }
    }

    pub const fn is_hover(&self) -> bool {
        self.roll == 0 && self.pitch == 0 && self.yaw == 0 && self.vertical == 0
    }
}

impl Display for MotionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[r {} p {} y {} v {} @ {:?}]",
            self.roll, self.pitch, self.yaw, self.vertical, self.duration
        )
    }
}

/// Datagrams understood by the vehicle side of the link.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMessage {
    Ping,
    Fly(MotionCommand),
    Payload,
    Stop,
}

impl LinkMessage {
    pub const PING: u8 = 0x0b;
    pub const FLY: u8 = 0xf1;
    pub const PAYLOAD: u8 = 0xa7;
    pub const STOP: u8 = 0xcd;
}

impl From<LinkMessage> for Vec<u8> {
    fn from(value: LinkMessage) -> Self {
        match value {
            LinkMessage::Ping => vec![LinkMessage::PING],

            LinkMessage::Fly(MotionCommand {
                roll,
                pitch,
                yaw,
                vertical,
                duration,
            }) => {
                let millis = duration.as_millis().min(u16::MAX as u128) as u16;

                [
                    LinkMessage::FLY.to_be_bytes().as_slice(),
                    roll.to_be_bytes().as_slice(),
                    pitch.to_be_bytes().as_slice(),
                    yaw.to_be_bytes().as_slice(),
                    vertical.to_be_bytes().as_slice(),
                    millis.to_be_bytes().as_slice(),
                ]
                .concat()
            }

            LinkMessage::Payload => vec![LinkMessage::PAYLOAD],

            LinkMessage::Stop => vec![LinkMessage::STOP],
        }
    }
}

impl TryFrom<&[u8]> for LinkMessage {
    type Error = ();

    fn try_from(buf: &[u8]) -> Result<Self, Self::Error> {
        let Some((&cmd, buf)) = buf.split_first() else {
            return Err(());
        };

        (|| {
            Some(match cmd {
                LinkMessage::PING => LinkMessage::Ping,
                LinkMessage::PAYLOAD => LinkMessage::Payload,
                LinkMessage::STOP => LinkMessage::Stop,

                LinkMessage::FLY => {
                    let axis = |i: usize| buf.get(i).map(|b| i8::from_be_bytes([*b]));

                    LinkMessage::Fly(MotionCommand {
                        roll: axis(0)?,
                        pitch: axis(1)?,
                        yaw: axis(2)?,
                        vertical: axis(3)?,
                        duration: Duration::from_millis(
                            u16::from_be_bytes(buf.get(4..6)?.try_into().ok()?) as u64,
                        ),
                    })
                }

                _ => return None,
            })
        })()
        .ok_or(())
    }
}
