use crate::cluster::slot::key_slot;
use crate::proto::codec::CommandEncoder;
use crate::proto::error::{Error, Result};
use crate::proto::frame::Reply;
use crate::proto::value::Value;

/// One command within a request, with its outcome.
#[derive(Debug)]
pub struct Command {
    name: String,
    args: Vec<Value>,
    result: Option<Reply>,
    error: Option<Error>,
}

impl Command {
    fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
            result: None,
            error: None,
        }
    }

    /// The command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The decoded reply, once the command completed.
    pub fn result(&self) -> Option<&Reply> {
        self.result.as_ref()
    }

    /// The error recorded for this command, if any.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }
}

/// An ordered batch of commands executed in sequence over one connection.
///
/// A request starts with a single command; [`add`](Request::add) appends
/// further commands to form a pipeline. Encoding emits all commands in
/// order and decoding reads exactly as many replies, so a batch costs one
/// round trip. Requests are single-use: send one, read its outcomes, drop
/// it.
///
/// The first command determines routing in cluster mode. After a failed
/// batch the first command's error text is inspected for `MOVED ` / `ASK `
/// prefixes and the redirect target recorded as `host:port`.
#[derive(Debug)]
pub struct Request {
    commands: Vec<Command>,
    slot: Option<u16>,
    moved: bool,
    redirect: bool,
    redirect_addr: String,
}

impl Request {
    /// Creates a request holding one command.
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            commands: vec![Command::new(name, args)],
            slot: None,
            moved: false,
            redirect: false,
            redirect_addr: String::new(),
        }
    }

    /// Appends a command to the batch.
    pub fn add(&mut self, name: impl Into<String>, args: Vec<Value>) {
        self.commands.push(Command::new(name, args));
    }

    /// Number of commands in the batch. Always at least one.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// A request always holds at least one command.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The commands of this batch, with their outcomes.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// The decoded reply of command `i`, once completed.
    pub fn result(&self, i: usize) -> Option<&Reply> {
        self.commands.get(i).and_then(|c| c.result())
    }

    /// The error of the last command that recorded one.
    pub fn error(&self) -> Option<&Error> {
        self.commands.iter().rev().find_map(|c| c.error())
    }

    /// True if the server asked this request to be retried elsewhere.
    pub fn redirect(&self) -> bool {
        self.redirect
    }

    /// True if the redirect was a permanent `MOVED`.
    pub fn moved(&self) -> bool {
        self.moved
    }

    /// The redirect target as `host:port`.
    pub fn redirect_addr(&self) -> &str {
        &self.redirect_addr
    }

    /// Consumes the request, yielding the last command's outcome.
    pub fn into_last_result(mut self) -> Result<Reply> {
        match self.commands.pop() {
            Some(Command {
                error: Some(err), ..
            }) => Err(err),
            Some(Command { result, .. }) => Ok(result.unwrap_or(Reply::Null)),
            None => Ok(Reply::Null),
        }
    }

    /// The routing slot, computed once from the first command's key and
    /// cached. The key is the first argument, except `EVALSHA` where the
    /// first key sits at positional argument 2.
    pub fn slot(&mut self) -> u16 {
        if let Some(slot) = self.slot {
            return slot;
        }
        let slot = key_slot(&self.routing_key());
        self.slot = Some(slot);
        slot
    }

    fn routing_key(&self) -> Vec<u8> {
        let cmd = &self.commands[0];
        let index = if cmd.name.eq_ignore_ascii_case("EVALSHA") {
            2
        } else {
            0
        };
        match cmd.args.get(index) {
            Some(Value::Bytes(b)) => b.to_vec(),
            Some(Value::Str(s)) => s.clone().into_bytes(),
            Some(Value::Int(k)) => k.to_string().into_bytes(),
            Some(Value::Uint(k)) => k.to_string().into_bytes(),
            Some(Value::Float(x)) => x.to_string().into_bytes(),
            Some(Value::Bool(true)) => b"1".to_vec(),
            Some(Value::Bool(false)) => b"0".to_vec(),
            _ => Vec::new(),
        }
    }

    /// Encodes every command of the batch in order.
    pub(crate) fn encode(&self, encoder: &mut CommandEncoder) -> Result<()> {
        for cmd in &self.commands {
            encoder.encode(&cmd.name, &cmd.args)?;
        }
        Ok(())
    }

    /// Clears outcomes and routing flags before a (re)send. The cached
    /// slot survives.
    pub(crate) fn begin_attempt(&mut self) {
        for cmd in &mut self.commands {
            cmd.result = None;
            cmd.error = None;
        }
        self.moved = false;
        self.redirect = false;
        self.redirect_addr.clear();
    }

    /// Records the reply for command `i`. Error replies set both the
    /// result (text stays inspectable) and the command error.
    pub(crate) fn set_reply(&mut self, i: usize, reply: Reply) {
        let cmd = &mut self.commands[i];
        if let Reply::Error(text) = &reply {
            cmd.error = Some(Error::Server {
                message: text.clone(),
            });
        }
        cmd.result = Some(reply);
    }

    /// Fails commands `i..` with copies of `err`.
    pub(crate) fn fail_from(&mut self, i: usize, err: &Error) {
        for cmd in &mut self.commands[i..] {
            cmd.error = Some(err.reclone());
        }
    }

    /// Fails every command with copies of `err`.
    pub(crate) fn fail_all(&mut self, err: &Error) {
        self.fail_from(0, err);
    }

    /// Inspects the first command's reply text after decoding a batch and
    /// records redirect state. The target address is the substring after
    /// the last space, without any scheme.
    pub(crate) fn note_redirect(&mut self) {
        let text = match self.commands[0].result() {
            Some(Reply::Error(text)) => text,
            _ => return,
        };

        self.moved = text.starts_with("MOVED ");
        self.redirect = self.moved || text.starts_with("ASK ");
        if self.redirect {
            let addr = match text.rfind(' ') {
                Some(i) => &text[i + 1..],
                None => "",
            };
            self.redirect_addr = addr.to_string();
        }
    }
}
