//! Control-socket command records (§6): local datagram/stream IPC a
//! front-end or external controller uses to drive and query the agent.
//! This module defines the request/response wire types and a small
//! in-process dispatcher; it does not itself decide what "install a
//! package" means -- that's the coordinator's job.

use std::collections::HashMap;

use crate::hwcompat::DeviceIdentity;
use crate::manifest::InstallPlan;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    GetStatus,
    ReqInstall,
    NotifyStream,
    SetUpdateState(String),
    GetUpdateState,
    SetAesKey { key_hex: String, iv_hex: Option<String> },
    SetVersion(String),
    EnableSuricatta(bool),
    PostUpdate,
    GetHw,
    GetVersion,
    SetVars(HashMap<String, String>),
    GetVars,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Ack {
    Ack(Response),
    Nack(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Empty,
    Status(String),
    UpdateState(String),
    Hardware { board: String, revision: String },
    Version(String),
    Vars(HashMap<String, String>),
}

/// Read-only query surface the control socket exposes in addition to
/// the install/progress-stream path the coordinator drives: these never
/// mutate session state.
pub struct QueryContext<'a> {
    pub device: &'a DeviceIdentity,
    pub current_plan: Option<&'a InstallPlan>,
    pub current_version: Option<&'a str>,
    pub update_state: &'a str,
    pub vars: &'a HashMap<String, String>,
}

pub fn handle_query(command: &Command, ctx: &QueryContext) -> Option<Ack> {
    match command {
        Command::GetHw => Some(Ack::Ack(Response::Hardware {
            board: ctx.device.board.clone(),
            revision: ctx.device.revision.clone(),
        })),
        Command::GetVersion => match ctx.current_plan {
            Some(plan) => Some(Ack::Ack(Response::Version(plan.software.version.clone()))),
            None => Some(Ack::Ack(Response::Version(ctx.current_version.unwrap_or_default().to_string()))),
        },
        Command::GetUpdateState => Some(Ack::Ack(Response::UpdateState(ctx.update_state.to_string()))),
        Command::GetVars => Some(Ack::Ack(Response::Vars(ctx.vars.clone()))),
        Command::GetStatus => Some(Ack::Ack(Response::Status(ctx.update_state.to_string()))),
        _ => None,
    }
}
