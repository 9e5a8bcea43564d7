use models::{Host, Team};

use crate::root_cause::RootCause;

/// Name of the team that owns network faults.
pub const NETWORK_TEAM: &str = "NetOps";

/// Message keyword routing an event to [`NETWORK_TEAM`].
const NETWORK_KEYWORD: &str = "net";

/// Decide which teams are responsible for an event.
///
/// Host owners are included unless the fault lies in a dependency, and network-looking
/// messages add every team named [`NETWORK_TEAM`]. If that selects nothing the host owners
/// are used anyway, so any event with known hosts gets at least one team. Identifiers are
/// returned once each, in first-seen order.
pub fn resolve_teams(hosts: &[Host], teams: &[Team], message: &str, cause: &RootCause) -> Vec<String> {
    let mut resolved = Vec::new();

    if !cause.is_dependency() {
        push_unique(&mut resolved, hosts.iter().map(|h| h.team.uuid.as_str()));
    }

    if message.to_lowercase().contains(NETWORK_KEYWORD) {
        push_unique(
            &mut resolved,
            teams.iter().filter(|t| t.name == NETWORK_TEAM).map(|t| t.uuid.as_str()),
        );
    }

    if resolved.is_empty() {
        push_unique(&mut resolved, hosts.iter().map(|h| h.team.uuid.as_str()));
    }

    resolved
}

fn push_unique<'a>(out: &mut Vec<String>, ids: impl Iterator<Item = &'a str>) {
    for id in ids {
        if !out.iter().any(|existing| existing == id) {
            out.push(id.to_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::root_cause::Package;

    fn team(uuid: &str, name: &str) -> Team {
        Team { uuid: uuid.to_owned(), name: name.to_owned(), users: Vec::new() }
    }

    fn host(uuid: &str, owner: Team) -> Host {
        Host { uuid: uuid.to_owned(), hostname: format!("{uuid}.local"), team: owner }
    }

    fn dependency() -> RootCause {
        RootCause::Dependency {
            package: Some(Package { name: "react".to_owned(), version: None }),
        }
    }

    fn code() -> RootCause {
        RootCause::Code { endpoint: "GET /".to_owned() }
    }

    #[test]
    fn code_issue_routes_to_host_owners_once() {
        let web = team("t-web", "Web");
        let hosts = [host("h1", web.clone()), host("h2", web.clone())];
        assert_eq!(resolve_teams(&hosts, &[web], "TypeError", &code()), vec!["t-web"]);
    }

    #[test]
    fn network_message_adds_netops() {
        let web = team("t-web", "Web");
        let teams = [web.clone(), team("t-net", "NetOps"), team("t-other", "netops")];
        let hosts = [host("h1", web)];
        assert_eq!(
            resolve_teams(&hosts, &teams, "NetworkError: connection reset", &code()),
            vec!["t-web", "t-net"]
        );
    }

    #[test]
    fn dependency_issue_skips_host_owners_when_netops_matches() {
        let web = team("t-web", "Web");
        let teams = [web.clone(), team("t-net", "NetOps")];
        let hosts = [host("h1", web)];
        assert_eq!(resolve_teams(&hosts, &teams, "fetch failed: net::ERR", &dependency()), vec![
            "t-net"
        ]);
    }

    #[test]
    fn falls_back_to_host_owners_when_nothing_matched() {
        let web = team("t-web", "Web");
        let api = team("t-api", "Api");
        let hosts = [host("h1", web.clone()), host("h2", api.clone())];
        assert_eq!(resolve_teams(&hosts, &[web, api], "TypeError", &dependency()), vec![
            "t-web", "t-api"
        ]);
    }

    #[test]
    fn no_hosts_and_no_keyword_resolves_nothing() {
        assert!(resolve_teams(&[], &[team("t-net", "NetOps")], "boom", &RootCause::Unknown).is_empty());
    }
}
