use crate::common::constants::{NOT_A_LIST_TASK_MSG, NO_HANDLER_MSG, SIGNAL_CHANNEL_SIZE};
use crate::common::{Error, Result};
use crate::config::EngineConfig;
use crate::datasource::Message;
use crate::sql::execution::Context;
use crate::sql::planner::PlanTask;
use crossbeam::channel::{self, select, Receiver, Sender, TryRecvError};
use log::{debug, warn};

pub type MessageSender = Sender<Message>;
pub type MessageReceiver = Receiver<Message>;
pub type SigSender = Sender<bool>;
pub type BoxedTask = Box<dyn TaskRunner>;
pub type Tasks = Vec<BoxedTask>;

/// Forwards, filters or transforms one message. Returning false stops the
/// task's message loop.
pub type MessageHandler = Box<dyn FnMut(&Context, Message) -> bool + Send>;

/// A unit of the dataflow graph. Every task owns an output channel, an error
/// channel and a signal channel; its input is the output of its producer.
pub trait TaskRunner: Send {
    fn base(&self) -> &TaskBase;

    fn base_mut(&mut self) -> &mut TaskBase;

    fn task_type(&self) -> &str {
        self.base().task_type()
    }

    /// Child tasks of composite tasks.
    fn children(&self) -> &[BoxedTask] {
        &[]
    }

    /// Adds a child. Only composite tasks accept children.
    fn add(&mut self, _task: BoxedTask) -> Result<()> {
        Err(Error::Plan(format!(
            "{NOT_A_LIST_TASK_MSG}: {}",
            self.task_type()
        )))
    }

    /// Records the task's depth in the graph and wires composites' children.
    fn setup(&mut self, depth: usize) -> Result<()> {
        self.base_mut().setup(depth)
    }

    fn message_in(&self) -> Option<MessageReceiver> {
        self.base().message_in()
    }

    fn message_out(&self) -> MessageReceiver {
        self.base().message_out()
    }

    fn set_message_in(&mut self, input: MessageReceiver) {
        self.base_mut().set_message_in(input)
    }

    fn err_chan(&self) -> Sender<Error> {
        self.base().err_chan()
    }

    fn sig_chan(&self) -> SigSender {
        self.base().sig_chan()
    }

    /// Runs the task to completion. The output channel is closed when this
    /// returns, whatever the outcome.
    fn run(&mut self, ctx: &Context) -> Result<()>;

    /// Releases the task's resources. Safe to call more than once.
    fn close(&mut self) -> Result<()> {
        self.base_mut().close()
    }

    /// A serializable description of the task.
    fn plan(&self) -> PlanTask;
}

/// Sends messages downstream unless the task is signalled first.
#[derive(Clone)]
pub struct Emitter {
    out: Option<MessageSender>,
    sig: Receiver<bool>,
}

impl Emitter {
    /// Blocks until the message is accepted downstream or a signal arrives.
    /// Returns false if the task should stop.
    pub fn emit(&self, msg: Message) -> bool {
        let Some(out) = &self.out else {
            return false;
        };
        select! {
            send(out, msg) -> res => res.is_ok(),
            recv(self.sig) -> _ => false,
        }
    }
}

/// The channels and message loop shared by all tasks.
pub struct TaskBase {
    task_type: String,
    depth: usize,
    closed: bool,
    handler: Option<MessageHandler>,
    msg_in: Option<MessageReceiver>,
    msg_out_tx: Option<MessageSender>,
    msg_out_rx: MessageReceiver,
    err_tx: Sender<Error>,
    err_rx: Receiver<Error>,
    sig_tx: SigSender,
    sig_rx: Receiver<bool>,
}

impl TaskBase {
    pub fn new(task_type: &str, conf: &EngineConfig) -> Self {
        let (msg_out_tx, msg_out_rx) = channel::bounded(conf.channel_size);
        let (err_tx, err_rx) = channel::bounded(conf.error_channel_size);
        let (sig_tx, sig_rx) = channel::bounded(SIGNAL_CHANNEL_SIZE);
        Self {
            task_type: task_type.to_string(),
            depth: 0,
            closed: false,
            handler: None,
            msg_in: None,
            msg_out_tx: Some(msg_out_tx),
            msg_out_rx,
            err_tx,
            err_rx,
            sig_tx,
            sig_rx,
        }
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn setup(&mut self, depth: usize) -> Result<()> {
        debug!("setup() {} depth:{depth}", self.task_type);
        self.depth = depth;
        Ok(())
    }

    pub fn set_handler(&mut self, handler: MessageHandler) {
        self.handler = Some(handler);
    }

    /// An emitter for this task's output channel.
    pub fn emitter(&self) -> Emitter {
        Emitter {
            out: self.msg_out_tx.clone(),
            sig: self.sig_rx.clone(),
        }
    }

    pub fn message_in(&self) -> Option<MessageReceiver> {
        self.msg_in.clone()
    }

    pub fn message_out(&self) -> MessageReceiver {
        self.msg_out_rx.clone()
    }

    pub fn set_message_in(&mut self, input: MessageReceiver) {
        self.msg_in = Some(input);
    }

    pub fn err_chan(&self) -> Sender<Error> {
        self.err_tx.clone()
    }

    pub fn sig_chan(&self) -> SigSender {
        self.sig_tx.clone()
    }

    pub fn sig_receiver(&self) -> Receiver<bool> {
        self.sig_rx.clone()
    }

    /// Records a runtime error, dropping it if the error channel is full.
    pub fn record_error(&self, err: Error) {
        warn!("{} error: {err}", self.task_type);
        if self.err_tx.try_send(err).is_err() {
            warn!("{} error channel full, dropping error", self.task_type);
        }
    }

    /// Non-blocking check of the error and signal channels. A pending error
    /// or signal ends the task.
    pub fn poll(&self) -> Option<Result<()>> {
        match self.err_rx.try_recv() {
            Ok(err) => return Some(Err(err)),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => {}
        }
        match self.sig_rx.try_recv() {
            Ok(_) => {
                debug!("{} got signal", self.task_type);
                Some(Ok(()))
            }
            Err(_) => None,
        }
    }

    /// The first error recorded but not yet surfaced, if any.
    pub fn pending_error(&self) -> Result<()> {
        match self.err_rx.try_recv() {
            Ok(err) => Err(err),
            Err(_) => Ok(()),
        }
    }

    /// Closes the output channel. Consumers see end of stream once the
    /// buffered messages are drained.
    pub fn close_output(&mut self) {
        if self.msg_out_tx.take().is_some() {
            debug!("{} closed output at depth {}", self.task_type, self.depth);
        }
    }

    /// The message loop: feeds every input message to the handler until the
    /// input closes, the handler refuses a message, or the task is signalled.
    pub fn run(&mut self, ctx: &Context) -> Result<()> {
        let Some(mut handler) = self.handler.take() else {
            warn!("returning, no handler {}", self.task_type);
            self.close_output();
            return Err(Error::Runtime(format!("{NO_HANDLER_MSG} ({})", self.task_type)));
        };
        let Some(input) = self.msg_in.clone() else {
            self.close_output();
            return Err(Error::Plan(format!("{} has no input", self.task_type)));
        };
        let result = ctx.recover(&self.task_type, || self.message_loop(ctx, &input, &mut handler));
        drop(handler);
        self.close_output();
        result
    }

    fn message_loop(
        &self,
        ctx: &Context,
        input: &MessageReceiver,
        handler: &mut MessageHandler,
    ) -> Result<()> {
        loop {
            if let Some(result) = self.poll() {
                return result;
            }
            select! {
                recv(input) -> msg => match msg {
                    Ok(msg) => {
                        if !handler(ctx, msg) {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                recv(self.sig_rx) -> _ => {
                    debug!("{} got signal", self.task_type);
                    break;
                }
            }
        }
        self.pending_error()
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.handler = None;
        self.close_output();
        Ok(())
    }
}

/// A handler that forwards every message unchanged.
pub fn make_handler(base: &TaskBase) -> MessageHandler {
    let emitter = base.emitter();
    Box::new(move |_ctx, msg| emitter.emit(msg))
}
