//! Terminal front end for interactive chat sessions.
//!
//! [`chat_loop`] owns the read-eval loop: it dispatches typed input to
//! [`crate::commands`], launches turns through [`crate::core::turn`], and
//! applies streamed events to the [`crate::core::conversation`] store.

pub mod chat_loop;
