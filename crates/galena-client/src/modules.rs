//! Catalogs of well-known remote functions.
//!
//! These are thin constructors over [`Function`](crate::Function); anything
//! a server plugin exports can be declared the same way in application
//! code, with its own message types.

/// Core methods exported by every server.
pub mod core {
    use galena_proto::{
        CoreBindReply, CoreBindRequest, CoreRunCommandRequest, EmptyMessage, IntMessage,
    };

    use crate::client::Client;
    use crate::function::Function;

    /// The reserved bind method (fixed wire id 0).
    pub fn bind(client: &Client) -> Function<'_, CoreBindRequest, CoreBindReply> {
        Function::with_id(client, "", "CoreBind", 0)
    }

    /// Runs a console command (fixed wire id 1). Output arrives as text
    /// notifications.
    pub fn run_command(client: &Client) -> Function<'_, CoreRunCommandRequest, EmptyMessage> {
        Function::with_id(client, "", "CoreRunCommand", 1)
    }

    /// Suspends the game core.
    pub fn suspend(client: &Client) -> Function<'_, EmptyMessage, IntMessage> {
        Function::new(client, "", "CoreSuspend")
    }

    /// Resumes the game core.
    pub fn resume(client: &Client) -> Function<'_, EmptyMessage, IntMessage> {
        Function::new(client, "", "CoreResume")
    }
}

/// Basic introspection methods.
pub mod basic {
    use galena_proto::{EmptyMessage, StringMessage};

    use crate::client::Client;
    use crate::function::Function;

    /// Server version string.
    pub fn get_version(client: &Client) -> Function<'_, EmptyMessage, StringMessage> {
        Function::new(client, "", "GetVersion")
    }

    /// Game version string.
    pub fn get_df_version(client: &Client) -> Function<'_, EmptyMessage, StringMessage> {
        Function::new(client, "", "GetDFVersion")
    }
}
