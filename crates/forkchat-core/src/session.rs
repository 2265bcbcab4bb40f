//! Chat session: the tree mutators and the streaming loop that feeds them.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;

use forkchat_ai::{
    ChatMessage, CompletionRequest, IngestConfig, ProviderRegistry, ResolvedModel,
    StreamIngestor, StreamOutcome, Transport,
};

use crate::{
    branch::default_leaf,
    conversation::Conversation,
    error::Result,
    events::ChatEvent,
    handle::ChatHandle,
    node::{MessageNode, NodeId, NodePatch, Role},
    title::{self, DEFAULT_TITLE_THRESHOLD},
};

/// Request parameters shared by every generation in a session
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Prepended to every streamed request
    pub system_prompt: Option<String>,
    /// Visible-path length that triggers automatic titling
    pub title_threshold: usize,
    pub ingest: IngestConfig,
    /// Model used for titles; the conversation's model when unset
    pub title_model: Option<String>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            system_prompt: None,
            title_threshold: DEFAULT_TITLE_THRESHOLD,
            ingest: IngestConfig::default(),
            title_model: None,
        }
    }
}

/// A finished stream and the node it was written into
#[derive(Debug)]
pub struct Generation {
    pub node_id: NodeId,
    pub outcome: StreamOutcome,
}

/// Result of an edit: the new sibling, plus its reply when one was generated
#[derive(Debug)]
pub struct Mutation {
    pub node_id: NodeId,
    pub generation: Option<Generation>,
}

/// Drives one conversation against a provider.
///
/// Cloning is cheap and every clone operates on the same conversation. The
/// conversation lock is never held across an `.await`.
#[derive(Clone)]
pub struct ChatSession {
    conversation: Arc<Mutex<Conversation>>,
    registry: Arc<ProviderRegistry>,
    transport: Arc<dyn Transport>,
    settings: GenerationSettings,
    event_tx: broadcast::Sender<ChatEvent>,
    handle: ChatHandle,
}

impl ChatSession {
    pub fn new(
        conversation: Conversation,
        registry: ProviderRegistry,
        transport: Arc<dyn Transport>,
        settings: GenerationSettings,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            conversation: Arc::new(Mutex::new(conversation)),
            registry: Arc::new(registry),
            transport,
            settings,
            event_tx,
            handle: ChatHandle::new(),
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.event_tx.subscribe()
    }

    pub fn handle(&self) -> ChatHandle {
        self.handle.clone()
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Shared conversation state
    pub fn conversation(&self) -> Arc<Mutex<Conversation>> {
        Arc::clone(&self.conversation)
    }

    /// Copy of the current conversation
    pub fn snapshot(&self) -> Conversation {
        self.conversation.lock().clone()
    }

    /// Owned copy of the visible path
    pub fn visible_path(&self) -> Vec<MessageNode> {
        self.conversation
            .lock()
            .visible_path()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Abort the current stream
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Change the model used for new generations
    pub fn set_model(&self, model: impl Into<String>) {
        let mut conv = self.conversation.lock();
        conv.model = model.into();
        conv.touch();
    }

    pub fn set_archived(&self, archived: bool) {
        let mut conv = self.conversation.lock();
        conv.is_archived = archived;
        conv.touch();
    }

    /// Append a user turn at the end of the visible path and stream a reply.
    ///
    /// Returns `Ok(None)` for blank input. Fails only when the conversation's
    /// model names no configured provider, in which case nothing is changed.
    pub async fn send_message(&self, content: &str) -> Result<Option<Generation>> {
        if content.trim().is_empty() {
            return Ok(None);
        }

        let (target, assistant_id, history, previous, current) = {
            let mut conv = self.conversation.lock();
            let target = self.registry.resolve(&conv.model)?;
            let previous = conv.message_count();
            let tail = conv.tail_id();

            let user_id = conv.insert_child(&tail, MessageNode::user(content))?;
            let placeholder = MessageNode::assistant_placeholder(conv.model.clone());
            let assistant_id = conv.insert_child(&user_id, placeholder)?;
            let history = conv.history_through(&user_id)?;
            (target, assistant_id, history, previous, conv.message_count())
        };

        let generation = self.stream_into(assistant_id, target, history, None).await;

        if title::crosses_threshold(previous, current, self.settings.title_threshold) {
            self.generate_title().await;
        }
        Ok(Some(generation))
    }

    /// Stream an alternative reply beside an assistant node on the visible path.
    ///
    /// The new sibling becomes the active branch; the original node is left
    /// untouched. `Ok(None)` when `message_id` is not a visible assistant node.
    pub async fn regenerate(&self, message_id: &NodeId) -> Result<Option<Generation>> {
        let (target, node_id, history) = {
            let mut conv = self.conversation.lock();
            let is_assistant = conv
                .get(message_id)
                .is_some_and(|n| n.role == Role::Assistant);
            if !is_assistant || !conv.is_on_visible_path(message_id) {
                return Ok(None);
            }
            let target = self.registry.resolve(&conv.model)?;
            let Some(parent) = conv.pool().parent_of(message_id).cloned() else {
                return Ok(None);
            };
            let history = conv.history_before(message_id)?;
            let placeholder = MessageNode::assistant_placeholder(conv.model.clone());
            let node_id = conv.insert_child(&parent, placeholder)?;
            (target, node_id, history)
        };

        let nonce = uuid::Uuid::new_v4().to_string();
        let generation = self
            .stream_into(node_id, target, history, Some(nonce))
            .await;
        Ok(Some(generation))
    }

    /// Branch a user or system node with new content.
    ///
    /// The sibling becomes the active branch, and every ancestor is selected
    /// so it lands on the visible path. A user edit immediately streams
    /// a fresh reply under it. `Ok(None)` for unknown ids, assistant nodes,
    /// and unchanged content.
    pub async fn edit_message(
        &self,
        message_id: &NodeId,
        new_content: &str,
    ) -> Result<Option<Mutation>> {
        let (node_id, pending) = {
            let mut conv = self.conversation.lock();
            let Some(original) = conv.get(message_id) else {
                return Ok(None);
            };
            let role = original.role;
            if !matches!(role, Role::User | Role::System) || original.content == new_content {
                return Ok(None);
            }
            let target = match role {
                Role::User => Some(self.registry.resolve(&conv.model)?),
                _ => None,
            };
            let Some(parent) = conv.pool().parent_of(message_id).cloned() else {
                return Ok(None);
            };

            let sibling = MessageNode::new(role, new_content, MessageNode::model_sentinel(role));
            let node_id = conv.insert_child(&parent, sibling)?;
            conv.reveal(&node_id)?;

            let pending = match target {
                Some(target) => {
                    let placeholder = MessageNode::assistant_placeholder(conv.model.clone());
                    let assistant_id = conv.insert_child(&node_id, placeholder)?;
                    let history = conv.history_through(&node_id)?;
                    Some((target, assistant_id, history))
                }
                None => None,
            };
            (node_id, pending)
        };

        let generation = match pending {
            Some((target, assistant_id, history)) => {
                Some(self.stream_into(assistant_id, target, history, None).await)
            }
            None => None,
        };
        Ok(Some(Mutation {
            node_id,
            generation,
        }))
    }

    /// Show sibling `index` of `message_id` instead of it.
    ///
    /// Returns the leaf reached from the new selection by first children, and
    /// broadcasts it as a [`ChatEvent::BranchFlash`]; `None` when the switch
    /// was out of range.
    pub fn switch_branch(&self, message_id: &NodeId, index: usize) -> Option<NodeId> {
        let leaf = {
            let mut conv = self.conversation.lock();
            let parent = conv.pool().parent_of(message_id)?.clone();
            if !conv.switch_branch(&parent, index) {
                return None;
            }
            let selected = conv.pool().children_of(&parent).get(index)?.clone();
            conv.touch();
            default_leaf(conv.pool(), &selected)
        };
        let _ = self.event_tx.send(ChatEvent::BranchFlash {
            leaf_id: leaf.clone(),
        });
        Some(leaf)
    }

    /// Ask the provider for a title and store it.
    ///
    /// Skipped while another title request is in flight. Failures leave the
    /// title unchanged and are only logged.
    pub async fn generate_title(&self) -> Option<String> {
        let (target, request) = {
            let mut conv = self.conversation.lock();
            if conv.is_generating_title {
                return None;
            }
            let model = self
                .settings
                .title_model
                .clone()
                .unwrap_or_else(|| conv.model.clone());
            let target = match self.registry.resolve(&model) {
                Ok(target) => target,
                Err(e) => {
                    tracing::warn!("Title generation skipped: {}", e);
                    return None;
                }
            };
            let request = title::title_request(&target.model, &conv.visible_path());
            conv.is_generating_title = true;
            (target, request)
        };
        let _ = self.event_tx.send(ChatEvent::TitleStart);

        let reply = self.transport.complete(&target, &request).await;

        let mut conv = self.conversation.lock();
        conv.is_generating_title = false;
        let title = match reply {
            Ok(raw) => title::clean_title(&raw),
            Err(e) => {
                tracing::warn!("Title generation failed: {}", e);
                return None;
            }
        };
        let Some(title) = title else {
            tracing::warn!("Title generation returned an empty title");
            return None;
        };
        conv.title = title.clone();
        conv.touch();
        drop(conv);

        let _ = self.event_tx.send(ChatEvent::TitleUpdated {
            title: title.clone(),
        });
        Some(title)
    }

    fn with_system_prompt(&self, mut history: Vec<ChatMessage>) -> Vec<ChatMessage> {
        if let Some(ref prompt) = self.settings.system_prompt {
            history.insert(0, ChatMessage::system(prompt.clone()));
        }
        history
    }

    /// Stream a completion into `node_id` and finalize it
    async fn stream_into(
        &self,
        node_id: NodeId,
        target: ResolvedModel,
        history: Vec<ChatMessage>,
        nonce: Option<String>,
    ) -> Generation {
        let request = CompletionRequest::streaming(
            target.model.clone(),
            self.with_system_prompt(history),
            self.settings.temperature,
            self.settings.max_tokens,
        );

        let (generation, cancel) = self.handle.begin(node_id.clone());
        tracing::debug!(
            node = %node_id,
            provider = %target.provider,
            model = %target.model,
            generation,
            "Starting generation"
        );
        let _ = self.event_tx.send(ChatEvent::StreamStart {
            node_id: node_id.clone(),
            model: forkchat_ai::provider::model_id(&target.provider, &target.model),
        });

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            opened = self.transport.open_stream(&target, &request, nonce.as_deref()) => Some(opened),
        };

        let outcome = match opened {
            None => StreamOutcome::cancelled(),
            Some(Err(e)) => StreamOutcome::failed(e),
            Some(Ok(body)) => {
                let conversation = Arc::clone(&self.conversation);
                let events = self.event_tx.clone();
                let handle = self.handle.clone();
                let id = node_id.clone();
                StreamIngestor::new(self.settings.ingest)
                    .run(body, cancel, move |delta| {
                        handle.push(generation, delta);
                        conversation.lock().append_content(&id, delta);
                        let _ = events.send(ChatEvent::Token {
                            node_id: id.clone(),
                            delta: delta.to_string(),
                        });
                    })
                    .await
            }
        };

        self.finalize(node_id, generation, outcome)
    }

    fn finalize(&self, node_id: NodeId, generation: u64, outcome: StreamOutcome) -> Generation {
        let content = outcome.finalized_content();
        {
            let mut conv = self.conversation.lock();
            if let Err(e) = conv.update_node(&node_id, NodePatch::finalize(content.clone())) {
                tracing::warn!("Could not finalize {}: {}", node_id, e);
            }
            conv.touch();
        }
        self.handle.finish(generation);

        if let Some(e) = outcome.error() {
            tracing::warn!("Generation into {} failed: {}", node_id, e);
            let _ = self.event_tx.send(ChatEvent::StreamError {
                node_id: node_id.clone(),
                message: e.to_string(),
                retryable: e.is_retryable(),
            });
        }
        let _ = self.event_tx.send(ChatEvent::StreamEnd {
            node_id: node_id.clone(),
            phase: outcome.terminal.phase(),
            content,
        });

        Generation { node_id, outcome }
    }
}
