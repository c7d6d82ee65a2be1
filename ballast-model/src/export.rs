// Operator-facing renderings of a configuration. JSON is the structural
// export (serde over the arena, indices included); properties is the flat
// key=value form, one line per setting, addressed by stripe and node
// position so it diffs cleanly between configurations.

use ballast_base::Result;

use crate::topology::Cluster;

pub fn to_json(cluster: &Cluster) -> Result<String> {
    Ok(serde_json::to_string_pretty(cluster)?)
}

pub fn to_properties(cluster: &Cluster) -> String {
    let mut lines = Vec::new();
    lines.push(format!("cluster.name={}", cluster.name));
    for (key, value) in cluster.settings.iter() {
        lines.push(format!("cluster.{}={}", key, value));
    }
    for (si, stripe) in cluster.stripes.iter().enumerate() {
        let s = si + 1;
        lines.push(format!("stripe.{}.name={}", s, stripe.name));
        for (mi, member) in cluster.stripe_members(crate::topology::StripeIdx(si as i64))
            .iter()
            .enumerate()
        {
            let n = mi + 1;
            lines.push(format!("stripe.{}.node.{}.name={}", s, n, member.name));
            lines.push(format!("stripe.{}.node.{}.address={}", s, n, member.addr));
            lines.push(format!("stripe.{}.node.{}.group-port={}", s, n, member.group_port));
            for (key, value) in member.settings.iter() {
                lines.push(format!("stripe.{}.node.{}.{}={}", s, n, key, value));
            }
        }
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}
