use std::any::Any;

use async_trait::async_trait;

use crate::application::ports::{Request, Transport};
use crate::domain::types::Feed;

use super::{Command, CommandError, send};

/// Connect or disconnect one feed.
#[derive(Debug, Clone)]
pub struct FeedCommand {
    feed: Feed,
    connect: bool,
}

impl FeedCommand {
    pub fn new(feed: Feed, connect: bool) -> Self {
        Self { feed, connect }
    }

    pub fn feed(&self) -> &Feed {
        &self.feed
    }

    fn request(&self, connect: bool) -> Request {
        if connect {
            Request::Connect(self.feed.clone())
        } else {
            Request::Disconnect(self.feed.clone())
        }
    }
}

#[async_trait]
impl Command for FeedCommand {
    fn text(&self) -> String {
        let verb = if self.connect { "Connect" } else { "Disconnect" };
        format!("{verb} {}", self.feed)
    }

    async fn delayed_redo(&mut self, transport: &dyn Transport) -> Result<(), CommandError> {
        send(transport, self.request(self.connect)).await?;
        Ok(())
    }

    async fn undo(&mut self, transport: &dyn Transport) -> Result<(), CommandError> {
        send(transport, self.request(!self.connect)).await?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
