//! Scripted session for tests

use std::collections::VecDeque;

use super::{Message, Session};
use crate::{Buffer, Response, TransportError};

/// Session answering from a script and recording every message written
#[derive(Debug, Default)]
pub struct MockSession {
    /// Replies returned by [`Session::read`], in order
    pub replies: VecDeque<Message>,
    /// Messages written so far
    pub sent: Vec<Message>,
}

impl MockSession {
    /// Create a session with scripted replies
    pub fn new(replies: impl IntoIterator<Item = Message>) -> Self {
        Self {
            replies: replies.into_iter().collect(),
            sent: Vec::new(),
        }
    }

    /// Queue a reply
    pub fn push(&mut self, reply: Message) -> &mut Self {
        self.replies.push_back(reply);
        self
    }

    /// Queue a card response
    pub fn push_card(&mut self, response: Response) -> &mut Self {
        self.push(Message::TokenPduResponse(Buffer::from(response.to_bytes())))
    }

    /// Queue a bare `90 00` card response
    pub fn push_ok(&mut self) -> &mut Self {
        self.push_card(Response::success(Buffer::new()))
    }

    /// APDUs written so far, in order
    pub fn sent_apdus(&self) -> Vec<Buffer> {
        self.sent
            .iter()
            .filter_map(|message| match message {
                Message::TokenPduRequest(pdu) => Some(pdu.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of written messages matching a predicate
    pub fn count_sent(&self, predicate: impl Fn(&Message) -> bool) -> usize {
        self.sent.iter().filter(|message| predicate(message)).count()
    }
}

impl Session for MockSession {
    fn write(&mut self, message: Message) -> Result<(), TransportError> {
        self.sent.push(message);
        Ok(())
    }

    fn read(&mut self) -> Result<Message, TransportError> {
        self.replies.pop_front().ok_or(TransportError::Closed)
    }
}
