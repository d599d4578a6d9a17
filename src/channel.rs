use tracing::info;

use crate::{
    error::Result,
    pairing::UserId,
    relay::{Content, Delivery, Notifier, SessionRelay},
    utils::event::{Action, ActionRequest},
};

/// Validate and run one inbound request. The user id is checked before
/// the action name.
pub fn handle_request<N: Notifier>(
    relay: &SessionRelay<N>,
    request: ActionRequest,
) -> Result<Delivery> {
    let user = request.user()?;
    let action = request.into_action()?;
    Ok(dispatch(relay, &user, action))
}

pub fn dispatch<N: Notifier>(relay: &SessionRelay<N>, user: &UserId, action: Action) -> Delivery {
    info!("dispatch {} from {}", action_name(&action), user);
    match action {
        Action::FindPartner => {
            relay.find_partner(user);
            Delivery::Notified
        }
        Action::Next => {
            relay.skip(user);
            Delivery::Notified
        }
        Action::Stop => relay.stop(user),
        Action::Typing => relay.forward(user, Content::Typing),
        Action::SendMessage(Some(text)) => relay.forward(user, Content::Chat(text)),
        Action::Signal(kind, Some(body)) => relay.forward(user, Content::Signal { kind, body }),
        Action::SendMessage(None) | Action::Signal(_, None) => Delivery::Dropped,
    }
}

fn action_name(action: &Action) -> &'static str {
    match action {
        Action::FindPartner => "findPartner",
        Action::SendMessage(_) => "sendMessage",
        Action::Typing => "typing",
        Action::Stop => "stop",
        Action::Next => "next",
        Action::Signal(..) => "signal",
    }
}
