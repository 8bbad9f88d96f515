pub(crate) fn tag_name(tag: &[String]) -> Option<&str> {
    tag.first().map(String::as_str)
}

pub(crate) fn tag_field(tag: &[String], index: usize) -> Option<&str> {
    tag.get(index).map(String::as_str)
}

pub(crate) fn is_tag(tag: &[String], name: &str) -> bool {
    matches!(tag_name(tag), Some(tag_name) if tag_name == name)
}

pub(crate) fn find_tag<'a>(tags: &'a [Vec<String>], name: &str) -> Option<&'a [String]> {
    tags.iter()
        .find(|tag| is_tag(tag, name) && tag_field(tag, 1).is_some())
        .map(Vec::as_slice)
}

pub(crate) fn find_tag_value<'a>(tags: &'a [Vec<String>], name: &str) -> Option<&'a str> {
    find_tag(tags, name).and_then(|tag| tag_field(tag, 1))
}

/// Whether any tag named `name` carries `value` as its first field.
pub(crate) fn has_tag_value(tags: &[Vec<String>], name: &str, value: &str) -> bool {
    tags.iter()
        .any(|tag| is_tag(tag, name) && tag_field(tag, 1) == Some(value))
}

/// First value among tags named by any of `names`, in tag order.
pub(crate) fn find_any_tag_value<'a>(
    tags: &'a [Vec<String>],
    names: &[&str],
) -> Option<&'a str> {
    tags.iter()
        .find(|tag| names.iter().any(|name| is_tag(tag, name)) && tag_field(tag, 1).is_some())
        .and_then(|tag| tag_field(tag, 1))
}

pub(crate) fn collect_tag_values(tags: &[Vec<String>], name: &str) -> Vec<String> {
    tags.iter()
        .filter(|tag| is_tag(tag, name))
        .filter_map(|tag| tag_field(tag, 1).map(str::to_owned))
        .collect()
}

/// Non-empty field at `index`, treating `""` as absent.
pub(crate) fn non_empty_field(tag: &[String], index: usize) -> Option<&str> {
    tag_field(tag, index).filter(|value| !value.trim().is_empty())
}
