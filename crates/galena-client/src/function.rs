//! Typed remote functions.
//!
//! A [`Function`] pairs a remote method name with its input and output
//! message types. Functions without a fixed wire id must be bound before
//! the first call; the binding is resolved through the client's shared
//! cache and survives until the next disconnect.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use prost::Message;

use galena_proto::TypeNamed;
use galena_wire::CommandResult;

use crate::binding::{BindRequest, Binding};
use crate::call::Call;
use crate::client::Client;
use crate::handle::{CallHandle, Notifications};

/// One-shot handle for the outcome of a bind.
#[derive(Debug, Clone)]
pub struct BindHandle {
    binding: Arc<Binding>,
}

impl BindHandle {
    fn new(binding: Arc<Binding>) -> Self {
        Self { binding }
    }

    /// Blocks until the bind resolves; true on success.
    pub fn wait(&self) -> bool {
        self.binding.wait()
    }

    /// Returns true if the binding resolved successfully and is still
    /// valid. A disconnect invalidates it.
    pub fn is_bound(&self) -> bool {
        self.binding.ready()
    }

    /// The underlying shared binding.
    pub fn binding(&self) -> Arc<Binding> {
        self.binding.clone()
    }
}

/// Aggregate handle for several binds issued in parallel.
#[derive(Debug)]
pub struct BindAllHandle {
    handles: Vec<BindHandle>,
}

impl BindAllHandle {
    /// Blocks until every bind resolves; true only if all succeeded.
    pub fn wait(&self) -> bool {
        // Evaluate every handle so all binds are awaited, not just the
        // first failure.
        self.handles.iter().fold(true, |ok, h| h.wait() && ok)
    }
}

/// Anything that can be bound; implemented by every [`Function`].
pub trait Bindable {
    /// Starts (or joins) the bind for this function.
    fn bind(&self) -> BindHandle;
}

/// Issues `bind()` on each function in parallel; the returned handle
/// resolves to the conjunction of the outcomes.
pub fn bind_all(functions: &[&dyn Bindable]) -> BindAllHandle {
    let handles = functions.iter().map(|f| f.bind()).collect();
    BindAllHandle { handles }
}

/// Final outcome of a typed call.
#[derive(Debug)]
pub struct FunctionReply<Out> {
    /// The command result.
    pub result: CommandResult,
    /// The parsed output message; present iff the result is `Ok`.
    pub output: Option<Out>,
}

/// One-shot handle for the result of a typed call.
#[derive(Debug)]
pub struct FunctionCallHandle<Out> {
    inner: CallHandle,
    _marker: PhantomData<fn() -> Out>,
}

impl<Out: 'static> FunctionCallHandle<Out> {
    fn new(inner: CallHandle) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Blocks until the call terminates.
    pub fn wait(self) -> FunctionReply<Out> {
        let reply = self.inner.wait();
        let result = reply.result;
        FunctionReply {
            result,
            output: reply.into_output::<Out>(),
        }
    }
}

/// A typed remote function: (module, name, input type, output type), with
/// an optional fixed wire id for the reserved core methods.
///
/// ```ignore
/// let suspend = modules::core::suspend(&client);
/// suspend.bind().wait();
/// let (reply, _notes) = suspend.call(&EmptyMessage {});
/// assert!(reply.wait().result.is_ok());
/// ```
pub struct Function<'a, In, Out> {
    client: &'a Client,
    module: &'static str,
    name: &'static str,
    fixed_id: Option<i16>,
    binding: Mutex<Option<Arc<Binding>>>,
    _marker: PhantomData<fn(&In) -> Out>,
}

impl<'a, In, Out> Function<'a, In, Out>
where
    In: Message + TypeNamed,
    Out: Message + TypeNamed + Default + 'static,
{
    /// Creates a function that must be bound before calling.
    pub fn new(client: &'a Client, module: &'static str, name: &'static str) -> Self {
        Self {
            client,
            module,
            name,
            fixed_id: None,
            binding: Mutex::new(None),
            _marker: PhantomData,
        }
    }

    /// Creates a function with a fixed wire id (reserved core methods).
    pub fn with_id(
        client: &'a Client,
        module: &'static str,
        name: &'static str,
        id: i16,
    ) -> Self {
        Self {
            client,
            module,
            name,
            fixed_id: Some(id),
            binding: Mutex::new(None),
            _marker: PhantomData,
        }
    }

    /// The method name this function calls.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Resolves the method binding through the client's cache.
    ///
    /// Functions with a fixed id resolve immediately without wire traffic.
    pub fn bind(&self) -> BindHandle {
        if let Some(id) = self.fixed_id {
            return BindHandle::new(Arc::new(Binding::bound(id)));
        }

        let request = BindRequest::new(self.module, self.name, In::TYPE_NAME, Out::TYPE_NAME);
        let binding = self.client.get_binding(&request);
        *self
            .binding
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(binding.clone());
        BindHandle::new(binding)
    }

    /// Returns true if the function can be called right now.
    pub fn is_bound(&self) -> bool {
        self.fixed_id.is_some()
            || self
                .binding
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                .is_some_and(|b| b.ready())
    }

    /// Calls the function.
    ///
    /// The input is serialized immediately and is reusable as soon as this
    /// returns. An unbound function (never bound, bind failed, or binding
    /// invalidated by a disconnect) fails fast with `LinkFailure`.
    pub fn call(&self, input: &In) -> (FunctionCallHandle<Out>, Notifications) {
        let id = match self.fixed_id {
            Some(id) => Some(id),
            None => self
                .binding
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                .and_then(|b| b.assigned_id()),
        };

        let Some(id) = id else {
            let (call, handle, notifications) = Call::new(0, Bytes::new(), None);
            call.finish(CommandResult::LinkFailure);
            return (FunctionCallHandle::new(handle), notifications);
        };

        let input = Bytes::from(input.encode_to_vec());
        let (handle, notifications) = self.client.call(id, input, Box::new(Out::default()));
        (FunctionCallHandle::new(handle), notifications)
    }
}

impl<'a, In, Out> Bindable for Function<'a, In, Out>
where
    In: Message + TypeNamed,
    Out: Message + TypeNamed + Default + 'static,
{
    fn bind(&self) -> BindHandle {
        Function::bind(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules;
    use galena_proto::EmptyMessage;

    #[test]
    fn fixed_id_functions_bind_without_wire_traffic() {
        let client = Client::new().expect("client");
        let run_command = modules::core::run_command(&client);

        assert!(run_command.is_bound());
        let handle = run_command.bind();
        assert!(handle.wait());
        assert_eq!(handle.binding().assigned_id(), Some(1));
    }

    #[test]
    fn unbound_call_fails_fast() {
        let client = Client::new().expect("client");
        let suspend = modules::core::suspend(&client);

        assert!(!suspend.is_bound());
        let (handle, notifications) = suspend.call(&EmptyMessage {});
        assert_eq!(handle.wait().result, CommandResult::LinkFailure);
        assert!(notifications.into_iter().next().is_none());
    }

    #[test]
    fn bind_all_reports_conjunction() {
        let client = Client::new().expect("client");
        let run_command = modules::core::run_command(&client);
        let suspend = modules::core::suspend(&client);

        // run_command has a fixed id and binds trivially; suspend cannot
        // bind without a link.
        let all = bind_all(&[&run_command, &suspend]);
        assert!(!all.wait());

        let fixed_only = bind_all(&[&run_command]);
        assert!(fixed_only.wait());
    }
}
