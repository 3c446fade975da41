use std::env::args;
use std::process::exit;
use std::sync::Arc;

use xmpp_engine::connection::{CloseReason, Connection, ConnectionConfig, ConnectionDelegate};
use xmpp_engine::jid::Jid;
use xmpp_engine::stanza::{Message, Presence};
use xmpp_engine::Client;

struct EchoBot;

impl ConnectionDelegate for EchoBot {
    fn connection_did_establish(&self, connection: &mut Connection) {
        let jid = connection
            .bound_jid()
            .map(|jid| format!("{}", jid))
            .unwrap_or("unknown".to_owned());
        println!("Online at {}", jid);
        connection.send(Presence::available()).unwrap();
    }

    fn connection_did_receive_message(&self, connection: &mut Connection, message: &Message) {
        if message.type_() == "error" {
            return;
        }
        match (&message.from, message.body()) {
            (Some(from), Some(body)) if body == "die" => {
                println!("Secret die command triggered by {}", from);
                connection.close();
            }
            (Some(from), Some(body)) => {
                // This is a message we'll echo
                connection.send(make_reply(from.clone(), &body)).unwrap();
            }
            _ => {}
        }
    }

    fn connection_was_closed(&self, _connection: &mut Connection, reason: &CloseReason) {
        println!("Closed: {:?}", reason);
    }
}

// Construct a chat <message/>
fn make_reply(to: Jid, body: &str) -> Message {
    Message::chat(to, body)
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = args().collect();
    if args.len() != 3 {
        println!("Usage: {} <jid> <password>", args[0]);
        exit(1);
    }
    let config = ConnectionConfig::new(&args[1])
        .expect(&format!("Invalid JID: {}", &args[1]))
        .with_password(args[2].clone());

    let mut client = Client::new(config).unwrap();
    client.connection_mut().add_delegate(Arc::new(EchoBot));

    if let Err(e) = client.run().await {
        println!("Connection failed: {}", e);
        exit(1);
    }
}
