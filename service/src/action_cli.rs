// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Command line access to the action table.

use clap::{value_parser, Arg, ArgMatches, Command};
use serde_json::{json, Value};
use spms_core::actions::{Action, Parameter, ParameterType};
use spms_core::protocol::ClientType;
use spms_core::{reply_result, ActionCall, ClientError, SpMsClient};

use crate::cli::ConnectionArgs;

fn parameter_arg(parameter: &'static Parameter) -> Arg {
    let arg = Arg::new(parameter.identifier)
        .help(parameter.help)
        .required(parameter.required)
        .allow_negative_numbers(true);
    match parameter.parameter_type {
        ParameterType::Int => arg.value_parser(value_parser!(i64)),
        ParameterType::Float => arg.value_parser(value_parser!(f64)),
        ParameterType::String => arg.value_parser(value_parser!(String)),
    }
}

fn offered_actions() -> impl Iterator<Item = &'static Action> {
    Action::all().filter(|action| !action.hidden)
}

/// One subcommand per action, with positional arguments generated from its parameters.
pub fn action_command() -> Command {
    Command::new("run")
        .no_binary_name(true)
        .subcommand_required(true)
        .subcommands(offered_actions().map(|action| {
            Command::new(action.identifier)
                .about(action.help)
                .args(action.parameters.iter().map(parameter_arg))
        }))
}

fn parameter_value(parameter: &Parameter, matches: &ArgMatches) -> Value {
    let value = match parameter.parameter_type {
        ParameterType::Int => matches.get_one::<i64>(parameter.identifier).map(|v| json!(v)),
        ParameterType::Float => matches.get_one::<f64>(parameter.identifier).map(|v| json!(v)),
        ParameterType::String => matches.get_one::<String>(parameter.identifier).map(|v| json!(v)),
    };
    value.unwrap_or(Value::Null)
}

/// Turns `identifier params...` into a call that asks for a reply.
pub fn parse_action_call(words: &[String]) -> Result<ActionCall, clap::Error> {
    let matches = action_command().try_get_matches_from(words)?;
    let Some((identifier, action_matches)) = matches.subcommand() else {
        return Err(action_command().error(clap::error::ErrorKind::MissingSubcommand, "no action given"));
    };
    let Some(action) = offered_actions().find(|action| action.identifier == identifier) else {
        return Err(action_command().error(clap::error::ErrorKind::InvalidSubcommand, identifier));
    };

    let mut params: Vec<Value> = action.parameters.iter().map(|p| parameter_value(p, action_matches)).collect();
    while params.last() == Some(&Value::Null) {
        params.pop();
    }
    Ok(ActionCall::with_reply(identifier, params))
}

/// Sends one action bundled with a one-shot handshake and prints its result.
pub async fn run_action(connection: &ConnectionArgs, words: &[String]) -> anyhow::Result<()> {
    let call = parse_action_call(words).unwrap_or_else(|e| e.exit());
    let config = connection.to_config(ClientType::CommandLineAction);

    let (client, handshake) = SpMsClient::connect_tcp(&config, std::slice::from_ref(&call)).await?;
    client.disconnect().await;

    let reply = handshake
        .action_replies
        .and_then(|replies| replies.into_iter().next())
        .ok_or(ClientError::EmptyMessage)?;
    if let Some(result) = reply_result(reply)? {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    Ok(())
}

pub fn print_actions() {
    for action in offered_actions() {
        let usage: Vec<String> = action
            .parameters
            .iter()
            .map(|p| if p.required { format!("<{}>", p.identifier) } else { format!("[{}]", p.identifier) })
            .collect();
        println!("{:<16} {:<36} {}", action.identifier, usage.join(" "), action.help);
    }
}
