//! The request table and dispatcher: the master's single entry point for
//! everything a worker sends it. A data-driven table instead of a
//! hand-written `match` per code, so scope handling lives in one place
//! rather than being repeated (and occasionally missed) per case.

use crate::protocol::{self, SessionState};
use crate::server::{Server, WorkerId};
use crate::session::SessionVerbContext;
use flux::logging::warn;
use mudnet::ipc::{MasterPacket, BCASTMSG};
use std::sync::Arc;
use worldmodel::{VerbHandler, ROOM_NONE};

/// Which session records a request's child phase visits.
#[derive(Copy, Clone, Eq, PartialEq)]
enum Scope {
    /// No child phase at all -- only the (optional) finalizer runs.
    None,
    /// Only the sender's own record.
    Sender,
    /// Every live session except the sender.
    AllButSender,
    /// Every live session, sender included.
    All,
}

type ChildFn = fn(&mut Server, WorkerId, WorkerId, &[u8]);
type FinalFn = fn(&mut Server, WorkerId, &[u8]);

struct Entry {
    cmd: u8,
    scope: Scope,
    child: Option<ChildFn>,
    finalize: Option<FinalFn>,
}

const fn entry(cmd: u8, scope: Scope, child: Option<ChildFn>, finalize: Option<FinalFn>) -> Entry {
    Entry { cmd, scope, child, finalize }
}

static TABLE: &[Entry] = &[
    entry(protocol::NOP, Scope::None, None, None),
    entry(BCASTMSG, Scope::All, Some(handle_bcastmsg_child), None),
    entry(protocol::CHANGESTATE, Scope::Sender, Some(handle_changestate_child), None),
    entry(protocol::CHANGEUSER, Scope::Sender, Some(handle_changeuser_child), None),
    entry(protocol::KICK, Scope::All, Some(handle_kick_child), None),
    entry(protocol::KICKALL, Scope::AllButSender, Some(handle_kickall_child), None),
    entry(protocol::LISTCLIENTS, Scope::All, Some(handle_listclients_child), Some(handle_listclients_finalize)),
    entry(protocol::SETROOM, Scope::None, None, Some(handle_setroom)),
    entry(protocol::MOVE, Scope::None, None, Some(handle_move)),
    entry(protocol::GETUSERDATA, Scope::None, None, Some(handle_getuserdata)),
    entry(protocol::ADDUSERDATA, Scope::None, None, Some(handle_adduserdata)),
    entry(protocol::DELUSERDATA, Scope::None, None, Some(handle_deluserdata)),
    entry(protocol::LOOKAT, Scope::None, None, Some(handle_lookat)),
    entry(protocol::TAKE, Scope::None, None, Some(handle_take)),
    entry(protocol::DROP, Scope::None, None, Some(handle_drop)),
    entry(protocol::EXECVERB, Scope::None, None, Some(handle_execverb)),
    entry(protocol::PRINTINVENTORY, Scope::None, None, Some(handle_printinventory)),
    entry(protocol::LISTUSERS, Scope::None, None, Some(handle_listusers)),
    entry(protocol::GETROOMDESC, Scope::None, None, Some(handle_getroomdesc)),
    entry(protocol::GETROOMNAME, Scope::None, None, Some(handle_getroomname)),
    entry(protocol::WAIT, Scope::None, None, Some(handle_wait)),
];

fn lookup(cmd: u8) -> Option<&'static Entry> {
    TABLE.iter().find(|entry| entry.cmd == cmd)
}

/// The dispatch algorithm:
///
/// 1. An unknown `sender_id` is logged and the packet dropped -- no `ALLDONE`
///    follows, since there is no live session to send one to.
/// 2. An unknown `cmd` is logged; the sender still gets its `ALLDONE` so it
///    never blocks forever on a request the master doesn't recognize.
/// 3. If scope is `Sender` or `All`, the child fn (if any) runs once with
///    `child == sender`.
/// 4. If scope is `AllButSender` or `All`, the child fn runs once per other
///    live session.
/// 5. The finalizer (if any) runs once, after every child invocation.
/// 6. `ALLDONE` goes back to the sender.
pub fn dispatch(server: &mut Server, sender: WorkerId, cmd: u8, payload: &[u8]) {
    if server.session(sender).is_none() {
        warn!(server.log, "dropping packet from unknown sender"; "sender" => sender, "cmd" => cmd);
        return;
    }

    let entry = match lookup(cmd) {
        Some(entry) => entry,
        None => {
            warn!(server.log, "dropping unknown request code"; "sender" => sender, "cmd" => cmd);
            server.send_alldone(sender);
            return;
        }
    };

    if let (Scope::Sender, Some(child)) | (Scope::All, Some(child)) = (entry.scope, entry.child) {
        child(server, sender, sender, payload);
    }

    if matches!(entry.scope, Scope::AllButSender | Scope::All) {
        if let Some(child) = entry.child {
            let others: Vec<WorkerId> = server.sessions.keys().copied().filter(|&id| id != sender).collect();
            for other in others {
                child(server, sender, other, payload);
            }
        }
    }

    if let Some(finalize) = entry.finalize {
        finalize(server, sender, payload);
    }

    server.send_alldone(sender);
}

fn handle_bcastmsg_child(server: &mut Server, _sender: WorkerId, child: WorkerId, payload: &[u8]) {
    server.send_packet(child, MasterPacket::new(BCASTMSG, payload.to_vec()));
}

fn handle_changestate_child(server: &mut Server, sender: WorkerId, _child: WorkerId, payload: &[u8]) {
    let state = match protocol::decode_changestate(payload) {
        Ok(state) => state,
        Err(_) => return,
    };

    if let Some(session) = server.session_mut(sender) {
        session.state = state;
    }

    if matches!(state, SessionState::LoggedInUser | SessionState::LoggedInAdmin) {
        let username = server.session(sender).and_then(|s| s.username.clone());
        if let Some(username) = username {
            if let Some(user) = server.userdb.lookup_mut(&username) {
                user.last_login = flux::time::timestamp_secs();
            }
        }
    }
}

fn handle_changeuser_child(server: &mut Server, sender: WorkerId, _child: WorkerId, payload: &[u8]) {
    let username = protocol::decode_changeuser(payload);
    if let Some(session) = server.session_mut(sender) {
        session.username = Some(username);
    }
}

/// Matches one `child` against `KICK`'s target id, forwards `KICK` to it
/// (the worker tears down its own connection on receipt), and reports
/// success to `sender`. Scope `All` means `sender` itself is a valid
/// target -- nothing exempts a session from kicking itself.
fn handle_kick_child(server: &mut Server, sender: WorkerId, child: WorkerId, payload: &[u8]) {
    let (target, message) = match protocol::decode_kick(payload) {
        Ok(pair) => pair,
        Err(_) => return,
    };

    if server.session(child).map_or(false, |s| s.worker_id == target) {
        server.send_packet(child, MasterPacket::new(protocol::KICK, message.into_bytes()));
        server.send_text(sender, "Success.");
    }
}

fn handle_kickall_child(server: &mut Server, _sender: WorkerId, child: WorkerId, payload: &[u8]) {
    server.send_packet(child, MasterPacket::new(protocol::KICK, payload.to_vec()));
}

/// Per-child: one descriptor line about `child`, sent to `sender` (not to
/// `child` itself -- this request builds a listing for whoever asked, unlike
/// `BCASTMSG`/`KICK` which address the child).
fn handle_listclients_child(server: &mut Server, sender: WorkerId, child: WorkerId, _payload: &[u8]) {
    let descriptor = match server.session(child) {
        Some(session) => {
            format!("{}: {} @ {}", session.worker_id, session.username.as_deref().unwrap_or("(connecting)"), session.addr)
        }
        None => return,
    };

    server.send_text(sender, &descriptor);
}

fn handle_listclients_finalize(server: &mut Server, sender: WorkerId, _payload: &[u8]) {
    server.send_text(sender, &format!("{} client(s) connected.", server.num_clients()));
}

/// Room occupancy is just "the current room of every session whose `room`
/// equals this id" -- there is no separate per-room member list to keep in
/// sync, so changing it is exactly this one field write.
fn handle_setroom(server: &mut Server, sender: WorkerId, payload: &[u8]) {
    let room = match protocol::decode_setroom(payload) {
        Ok(room) => room,
        Err(_) => return,
    };

    if let Some(session) = server.session_mut(sender) {
        session.room = room;
    }
}

/// Hook order: `on_enter` of the destination room is consulted before
/// `on_leave` of the current one; both must pass for the move to happen.
fn handle_move(server: &mut Server, sender: WorkerId, payload: &[u8]) {
    let direction = match protocol::decode_move(payload) {
        Some(direction) => direction,
        None => {
            reject_move(server, sender);
            return;
        }
    };

    let (current_room, username) = match server.session(sender) {
        Some(session) => (session.room, session.username.clone().unwrap_or_default()),
        None => return,
    };

    let destination = server.world.room(current_room).map_or(ROOM_NONE, |room| room.adjacent(direction));
    if destination == ROOM_NONE {
        reject_move(server, sender);
        return;
    }

    let enter_ok = server.world.room(destination).map_or(false, |room| room.on_enter(&username));
    let leave_ok = server.world.room(current_room).map_or(true, |room| room.on_leave(&username));

    if !(enter_ok && leave_ok) {
        reject_move(server, sender);
        return;
    }

    if let Some(session) = server.session_mut(sender) {
        session.room = destination;
    }
    server.send_packet(sender, MasterPacket::new(protocol::MOVE, protocol::encode_move_reply(true)));
}

fn reject_move(server: &mut Server, sender: WorkerId) {
    server.send_text(sender, "You cannot go that way.");
    server.send_packet(sender, MasterPacket::new(protocol::MOVE, protocol::encode_move_reply(false)));
}

fn handle_getuserdata(server: &mut Server, sender: WorkerId, payload: &[u8]) {
    let username = match protocol::decode_username_payload(payload) {
        Ok(username) => username,
        Err(_) => return,
    };

    let reply = match server.userdb.lookup(&username) {
        Some(user) => protocol::encode_getuserdata_reply(Some((&user.salt, &user.digest, user.privilege.to_raw(), user.last_login))),
        None => protocol::encode_getuserdata_reply(None),
    };

    server.send_packet(sender, MasterPacket::new(protocol::GETUSERDATA, reply));
}

/// Admin-only. Always reports success once authorized -- adding a user
/// whose name already exists overwrites, matching `UserDb::add`'s own
/// overwrite-on-conflict behavior.
fn handle_adduserdata(server: &mut Server, sender: WorkerId, payload: &[u8]) {
    if !is_admin(server, sender) {
        server.send_packet(sender, MasterPacket::new(protocol::ADDUSERDATA, protocol::encode_bool_reply(false)));
        return;
    }

    let (username, password, privilege_raw) = match protocol::decode_adduserdata(payload) {
        Ok(triple) => triple,
        Err(_) => return,
    };

    let privilege = userdb::Privilege::from_raw(privilege_raw);
    server.userdb.add(userdb::User::new(&username, &password, privilege));
    server.send_packet(sender, MasterPacket::new(protocol::ADDUSERDATA, protocol::encode_bool_reply(true)));
    crate::persist::bump(server, true);
}

fn handle_deluserdata(server: &mut Server, sender: WorkerId, payload: &[u8]) {
    if !is_admin(server, sender) {
        server.send_packet(sender, MasterPacket::new(protocol::DELUSERDATA, protocol::encode_bool_reply(false)));
        return;
    }

    let username = match protocol::decode_username_payload(payload) {
        Ok(username) => username,
        Err(_) => return,
    };

    let removed = server.userdb.remove(&username).is_some();
    server.send_packet(sender, MasterPacket::new(protocol::DELUSERDATA, protocol::encode_bool_reply(removed)));
    if removed {
        crate::persist::bump(server, true);
    }
}

/// Searches the current room first, then the sender's own inventory,
/// producing one labeled line per matching instance via the object class's
/// own `describe` hook.
fn handle_lookat(server: &mut Server, sender: WorkerId, payload: &[u8]) {
    let noun = protocol::decode_bare_string(payload);

    let (room_id, username) = match server.session(sender) {
        Some(session) => (session.room, session.username.clone().unwrap_or_default()),
        None => return,
    };

    let mut lines = Vec::new();
    if let Some(room) = server.world.room(room_id) {
        for instance in room.objects.lookup(&noun) {
            lines.push(instance.describe(&username));
        }
    }
    if let Some(user) = server.userdb.lookup(&username) {
        for instance in user.inventory.lookup(&noun) {
            lines.push(instance.describe(&username));
        }
    }

    if lines.is_empty() {
        lines.push("You don't see that here.".to_string());
    }
    server.send_text(sender, &lines.join("\n"));
}

/// Walks every one of the current room's objects matching `noun`, taking
/// each instance whose class doesn't veto the take and leaving a message per
/// veto. `remove_at` compacts the bucket on removal, so a taken instance's
/// former index is immediately filled by the next one -- the scan position
/// only advances past an instance that stays behind.
fn handle_take(server: &mut Server, sender: WorkerId, payload: &[u8]) {
    let noun = protocol::decode_bare_string(payload);

    let (room_id, username) = match server.session(sender) {
        Some(session) => (session.room, session.username.clone().unwrap_or_default()),
        None => return,
    };

    let room = match server.world.room_mut(room_id) {
        Some(room) => room,
        None => return,
    };

    if room.objects.count(&noun) == 0 {
        server.send_text(sender, "You don't see that here.");
        return;
    }

    let mut messages = Vec::new();
    let mut taken = false;
    let mut index = 0;
    loop {
        let can_take = match room.objects.lookup(&noun).get(index) {
            Some(instance) => instance.can_take(&username),
            None => break,
        };

        if !can_take {
            messages.push("You can't take that.".to_string());
            index += 1;
            continue;
        }

        if let Some(instance) = room.objects.remove_at(&noun, index) {
            if let Some(user) = server.userdb.lookup_mut(&username) {
                user.inventory.insert(instance);
            }
            messages.push("Taken.".to_string());
            taken = true;
        }
    }

    server.send_text(sender, &messages.join("\n"));
    if taken {
        crate::persist::bump(server, false);
    }
}

/// Drop-by-duplicate, applied to every inventory instance matching `noun`:
/// each original is removed from inventory, a duplicate is placed in the
/// room, and the *transferred* instance's `drop` hook is consulted. A veto
/// reverses both halves of that instance's move before either is visible,
/// and doesn't affect the other instances being dropped in the same
/// request. All matching instances are pulled out of inventory up front so
/// a veto putting one back can't be picked up again by the same scan.
fn handle_drop(server: &mut Server, sender: WorkerId, payload: &[u8]) {
    let noun = protocol::decode_bare_string(payload);

    let (room_id, username) = match server.session(sender) {
        Some(session) => (session.room, session.username.clone().unwrap_or_default()),
        None => return,
    };

    let mut originals = Vec::new();
    if let Some(user) = server.userdb.lookup_mut(&username) {
        while let Some(instance) = user.inventory.remove_first(&noun) {
            originals.push(instance);
        }
    }

    if originals.is_empty() {
        server.send_text(sender, "You aren't carrying that.");
        return;
    }

    let mut messages = Vec::new();
    let mut dropped = false;

    for original in originals {
        let duplicate = original.duplicate();

        let room = match server.world.room_mut(room_id) {
            Some(room) => room,
            None => {
                // No room to drop into -- put the original back untouched.
                if let Some(user) = server.userdb.lookup_mut(&username) {
                    user.inventory.insert(original);
                }
                continue;
            }
        };

        room.objects.insert(duplicate);
        let inserted_index = room.objects.count(&noun) - 1;
        let vetoed = !room.objects.lookup(&noun)[inserted_index].can_drop(&username);

        if vetoed {
            room.objects.remove_at(&noun, inserted_index);
            if let Some(user) = server.userdb.lookup_mut(&username) {
                user.inventory.insert(original);
            }
            messages.push("You cannot drop that.".to_string());
        } else {
            messages.push("Dropped.".to_string());
            dropped = true;
        }
    }

    server.send_text(sender, &messages.join("\n"));
    if dropped {
        crate::persist::bump(server, false);
    }
}

/// While a session is in raw mode, `EXECVERB` bypasses tokenization
/// entirely and is redelivered verbatim to the handler that last flipped
/// raw mode on. Otherwise the first whitespace-delimited word is lowercased
/// and looked up in the current room's verb map, falling back to the
/// world's global one.
fn handle_execverb(server: &mut Server, sender: WorkerId, payload: &[u8]) {
    let line = String::from_utf8_lossy(payload).into_owned();

    let (room_id, raw_mode, raw_handler) = match server.session(sender) {
        Some(session) => (session.room, session.raw_mode, session.raw_handler.clone()),
        None => return,
    };

    if raw_mode {
        if let Some(handler) = raw_handler {
            invoke_verb(server, sender, &handler, &line);
            clear_raw_handler_if_mode_dropped(server, sender);
        }
        return;
    }

    let mut parts = line.splitn(2, char::is_whitespace);
    let verb_word = parts.next().unwrap_or("").to_lowercase();
    let rest = parts.next().unwrap_or("").trim_start();

    let handler = server
        .world
        .room(room_id)
        .and_then(|room| room.verbs.get(&verb_word))
        .or_else(|| server.world.verbs.get(&verb_word))
        .cloned();

    match handler {
        Some(handler) => {
            invoke_verb(server, sender, &handler, rest);
            if server.session(sender).map_or(false, |s| s.raw_mode) {
                if let Some(session) = server.session_mut(sender) {
                    session.raw_handler = Some(handler);
                }
            }
        }
        None => server.send_text(sender, &format!("I don't understand \"{}\".", verb_word)),
    }
}

fn invoke_verb(server: &mut Server, sender: WorkerId, handler: &Arc<dyn VerbHandler>, rest: &str) {
    if let Some(session) = server.session_mut(sender) {
        let mut ctx = SessionVerbContext { session };
        handler.invoke(&mut ctx, rest);
    }
}

fn clear_raw_handler_if_mode_dropped(server: &mut Server, sender: WorkerId) {
    if !server.session(sender).map_or(false, |s| s.raw_mode) {
        if let Some(session) = server.session_mut(sender) {
            session.raw_handler = None;
        }
    }
}

fn handle_printinventory(server: &mut Server, sender: WorkerId, _payload: &[u8]) {
    let username = match server.session(sender).and_then(|s| s.username.clone()) {
        Some(username) => username,
        None => return,
    };

    let lines = match server.userdb.lookup(&username) {
        Some(user) if !user.inventory.is_empty() => user
            .inventory
            .keys()
            .map(|noun| {
                let instances = user.inventory.lookup(noun);
                format_noun(noun, instances.len(), instances.first().map_or(false, |i| i.default_article))
            })
            .collect::<Vec<_>>(),
        _ => vec!["Nothing!".to_string()],
    };

    server.send_text(sender, &lines.join("\n"));
}

fn handle_listusers(server: &mut Server, sender: WorkerId, _payload: &[u8]) {
    if !is_admin(server, sender) {
        server.send_text(sender, "Access denied.");
        return;
    }

    let mut names: Vec<String> = server.userdb.usernames().cloned().collect();
    names.sort();
    server.send_text(sender, &names.join("\n"));
}

/// Spec §4.3: the room's free-text description, followed by one generated
/// line per distinct listed, non-hidden noun present.
fn handle_getroomdesc(server: &mut Server, sender: WorkerId, _payload: &[u8]) {
    let room_id = match server.session(sender) {
        Some(session) => session.room,
        None => return,
    };

    let room = match server.world.room(room_id) {
        Some(room) => room,
        None => return,
    };

    let mut lines = vec![room.description.clone()];
    for noun in room.objects.keys() {
        let visible: Vec<_> = room.objects.lookup(noun).iter().filter(|i| i.list && !i.hidden).collect();
        if visible.is_empty() {
            continue;
        }

        let phrase = format_noun(noun, visible.len(), visible[0].default_article);
        lines.push(if visible.len() == 1 { format!("There is {} here.", phrase) } else { format!("There are {} here.", phrase) });
    }

    server.send_text(sender, &lines.join("\n"));
}

fn handle_getroomname(server: &mut Server, sender: WorkerId, _payload: &[u8]) {
    let room_id = match server.session(sender) {
        Some(session) => session.room,
        None => return,
    };

    if let Some(room) = server.world.room(room_id) {
        server.send_text(sender, &room.name.clone());
    }
}

/// Intentional blocking sleep; a test hook for exercising backpressure
/// against a stalled master.
fn handle_wait(_server: &mut Server, _sender: WorkerId, _payload: &[u8]) {
    std::thread::sleep(std::time::Duration::from_secs(10));
}

fn is_admin(server: &Server, id: WorkerId) -> bool {
    server.session(id).map_or(false, |s| s.state == SessionState::LoggedInAdmin)
}

fn is_vowel(c: char) -> bool {
    matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u')
}

/// Renders a noun with either an indefinite article (singular, when the
/// object class says it wants a default article) or a count prefix
/// (plural).
fn format_noun(name: &str, count: usize, default_article: bool) -> String {
    if count == 1 {
        if default_article {
            let article = if name.chars().next().map_or(false, is_vowel) { "an" } else { "a" };
            format!("{} {}", article, name)
        } else {
            name.to_string()
        }
    } else {
        format!("{} {}s", count, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_noun_singular_with_article() {
        assert_eq!(format_noun("lamp", 1, true), "a lamp");
        assert_eq!(format_noun("apple", 1, true), "an apple");
    }

    #[test]
    fn format_noun_singular_without_article() {
        assert_eq!(format_noun("gold", 1, false), "gold");
    }

    #[test]
    fn format_noun_plural_ignores_article_flag() {
        assert_eq!(format_noun("lamp", 3, true), "3 lamps");
    }

    #[test]
    fn table_has_exactly_one_entry_per_known_code() {
        assert!(lookup(protocol::TAKE).is_some());
        assert!(lookup(protocol::WAIT).is_some());
        assert!(lookup(200).is_none());
    }
}
