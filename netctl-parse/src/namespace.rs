/// Parses `ip netns list` output into namespace names.
///
/// Each line is `name` or `name (id: N)`.
pub fn parse_namespaces(output: &str) -> Vec<String> {
    output.lines().filter_map(|line| line.split_whitespace().next()).map(str::to_string).collect()
}
