use crate::body::{
    DecodedBody, DecodedMessage, Defect, DefectKind, FieldValue, Multiplexed, OpaqueStruct,
};
use crate::error::HeaderError;
use crate::header::{DecodedHeader, HeaderKind};
use crate::packet::{decode_packet, DecodedPacket};
use crate::record::RawRecord;
use crate::registry::Registry;
use crate::value::Scalar;

use super::{NodeKind, ProjectionConfig, TreeNode};

/// Projects a decoded packet. The root is labelled with the registry name of
/// the message type, or `fallback_label` when it has none.
pub fn project(
    packet: &DecodedPacket,
    fallback_label: &str,
    config: &ProjectionConfig,
) -> TreeNode {
    let projector = Projector { config };
    let label = packet
        .message_name
        .clone()
        .unwrap_or_else(|| fallback_label.to_string());
    let children = projector.packet_children(packet, 0);
    let mut root = TreeNode::group(NodeKind::Root, label, children);
    root.annotation = packet
        .body
        .as_ref()
        .and_then(DecodedBody::type_name)
        .map(str::to_string);
    root.expand_by_default = true;
    root
}

/// Decodes and projects one record.
///
/// When the header cannot be decoded the filename metadata and the raw
/// payload are shown instead of a body.
pub fn get_tree(record: &RawRecord, registry: &Registry, config: &ProjectionConfig) -> TreeNode {
    let packet = decode_packet(&record.payload, registry);
    let mut root = project(&packet, &record.label(), config);
    if packet.header.is_err() {
        let fallbacks = filename_fallbacks(record);
        let header = root.children.iter_mut().find(|c| is_header(c));
        if let Some(header) = header {
            header.children.extend(fallbacks);
        }
        let projector = Projector { config };
        let payload = projector.raw_bytes(NodeKind::Unknown, "payload", &record.payload, 0);
        root.children.push(payload);
    }
    root
}

fn is_header(node: &TreeNode) -> bool {
    node.kind == NodeKind::Header
}

fn filename_fallbacks(record: &RawRecord) -> Vec<TreeNode> {
    let mut fields = Vec::new();
    if let Some(emsg) = record.filename_discriminator {
        let value = Scalar::UInt(u64::from(emsg));
        fields.push(TreeNode::leaf(NodeKind::Field, "filename_type", value));
    }
    if let Some(name) = &record.name {
        let value = Scalar::Str(name.clone());
        fields.push(TreeNode::leaf(NodeKind::Field, "filename_name", value));
    }
    fields
}

struct Projector<'c> {
    config: &'c ProjectionConfig,
}

impl Projector<'_> {
    /// Expansion hint, from node class and nesting level alone. Level 0 is
    /// the header and body of the top-level packet.
    fn expand(&self, kind: NodeKind, level: usize, children: usize) -> bool {
        if children == 0 {
            return false;
        }
        let bulky = children > self.config.collapse_repeated_over;
        match kind {
            NodeKind::Root => true,
            NodeKind::Header | NodeKind::Body | NodeKind::Opaque if level == 0 => true,
            NodeKind::Repeated | NodeKind::Unknown | NodeKind::Field if bulky => false,
            _ => level <= self.config.expand_depth,
        }
    }

    fn finish(&self, mut node: TreeNode, level: usize) -> TreeNode {
        node.expand_by_default = self.expand(node.kind, level, node.children.len());
        node
    }

    fn packet_children(&self, packet: &DecodedPacket, level: usize) -> Vec<TreeNode> {
        let mut children = vec![self.header(packet, level)];
        if let Some(body) = &packet.body {
            children.push(self.body(body, level));
        }
        children
    }

    fn header(&self, packet: &DecodedPacket, level: usize) -> TreeNode {
        let node = match &packet.header {
            Ok(header) => {
                let fields = header_fields(header, packet);
                let kind = header.kind.as_str();
                TreeNode::group(NodeKind::Header, "header", fields).annotated(kind)
            }
            Err(err) => {
                let fields = vec![header_marker(err)];
                TreeNode::group(NodeKind::Header, "header", fields).annotated("failed")
            }
        };
        self.finish(node, level)
    }

    fn body(&self, body: &DecodedBody, level: usize) -> TreeNode {
        match body {
            DecodedBody::Structured(m) => {
                let children = self.message_children(m, level + 1);
                let node = TreeNode::group(NodeKind::Body, "body", children);
                self.finish(node.annotated(m.type_name.clone()), level)
            }
            DecodedBody::Opaque(o) => self.opaque(o, level),
            DecodedBody::Unknown { bytes } => {
                self.raw_bytes(NodeKind::Unknown, "body", bytes, level)
            }
        }
    }

    fn message_children(&self, m: &DecodedMessage, level: usize) -> Vec<TreeNode> {
        let mut children: Vec<TreeNode> = m
            .fields
            .iter()
            .map(|f| self.field(f.name.clone(), &f.value, level))
            .collect();
        children.extend(m.defect.as_ref().map(marker));
        children
    }

    fn field(&self, label: String, value: &FieldValue, level: usize) -> TreeNode {
        match value {
            FieldValue::Scalar { value } => TreeNode::leaf(NodeKind::Field, label, value.clone()),
            FieldValue::Mismatched { wire_type, raw } => {
                let annotation = format!("unexpected {wire_type}");
                TreeNode::leaf(NodeKind::Field, label, raw.clone()).annotated(annotation)
            }
            FieldValue::Message(m) => {
                let children = self.message_children(m, level + 1);
                let node = TreeNode::group(NodeKind::Message, label, children);
                self.finish(node.annotated(m.type_name.clone()), level)
            }
            FieldValue::Repeated { items } => {
                let children = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let mut node = self.field(format!("[{i}]"), item, level + 1);
                        if node.kind == NodeKind::Field {
                            node.kind = NodeKind::Element;
                        }
                        node
                    })
                    .collect();
                let node = TreeNode::group(NodeKind::Repeated, label, children);
                self.finish(node.annotated(format!("{} items", items.len())), level)
            }
            FieldValue::Multiplexed(multi) => self.multiplexed(label, multi, level),
        }
    }

    fn multiplexed(&self, label: String, multi: &Multiplexed, level: usize) -> TreeNode {
        let mut children: Vec<TreeNode> = multi
            .packets
            .iter()
            .enumerate()
            .map(|(i, packet)| {
                let annotation = match (&packet.message_name, packet.message_type()) {
                    (Some(name), _) => name.clone(),
                    (None, Some(emsg)) => emsg.to_string(),
                    (None, None) => "header failed".to_string(),
                };
                let children = self.packet_children(packet, level + 2);
                let node = TreeNode::group(NodeKind::Packet, format!("[{i}]"), children);
                self.finish(node.annotated(annotation), level + 1)
            })
            .collect();
        if let Some(raw) = &multi.raw {
            children.push(self.raw_bytes(NodeKind::Field, "raw", raw, level + 1));
        }
        children.extend(multi.defect.as_ref().map(marker));

        let count = multi.packets.len();
        let annotation = match multi.compressed_len {
            Some(len) => format!("{count} packets, {len} bytes compressed"),
            None => format!("{count} packets"),
        };
        let node = TreeNode::group(NodeKind::Multiplexed, label, children);
        self.finish(node.annotated(annotation), level)
    }

    fn opaque(&self, o: &OpaqueStruct, level: usize) -> TreeNode {
        let mut children: Vec<TreeNode> = o
            .fields
            .iter()
            .map(|f| self.field(f.name.clone(), &f.value, level + 1))
            .collect();
        if let Some((label, bytes)) = &o.trailing {
            children.push(self.raw_bytes(NodeKind::Field, label, bytes, level + 1));
        }
        children.extend(o.defect.as_ref().map(marker));
        let node = TreeNode::group(NodeKind::Opaque, "body", children);
        self.finish(node.annotated(o.layout.clone()), level)
    }

    /// Bytes kept verbatim as the node value, with hex rows as children.
    fn raw_bytes(&self, kind: NodeKind, label: &str, bytes: &[u8], level: usize) -> TreeNode {
        let width = self.config.hex_row_width.max(1);
        let rows = bytes
            .chunks(width)
            .enumerate()
            .map(|(i, row)| {
                let offset = format!("{:04x}", i * width);
                TreeNode::leaf(NodeKind::HexRow, offset, Scalar::Bytes(row.to_vec()))
            })
            .collect();
        let annotation = format!("{} bytes", bytes.len());
        let mut node = TreeNode::group(kind, label, rows).annotated(annotation);
        node.value = Some(Scalar::Bytes(bytes.to_vec()));
        self.finish(node, level)
    }
}

fn header_fields(header: &DecodedHeader, packet: &DecodedPacket) -> Vec<TreeNode> {
    let leaf = |label: &str, value: Scalar| TreeNode::leaf(NodeKind::Field, label, value);
    let uint = |value: u32| Scalar::UInt(u64::from(value));
    let int = |value: i32| Scalar::Int(i64::from(value));

    let message_type = Scalar::Enum {
        value: i64::from(header.message_type),
        name: packet.message_name.clone(),
    };
    let mut fields = vec![
        leaf("message_type", message_type),
        leaf("raw_type", uint(header.raw_type)),
        leaf("is_proto", Scalar::Bool(header.is_proto())),
    ];
    for c in &header.correlation_ids {
        fields.push(leaf(c.role.label(), Scalar::UInt(c.job_id)));
    }
    match &header.kind {
        HeaderKind::Simple => {}
        HeaderKind::Extended {
            header_size,
            header_version,
            canary,
            steam_id,
            session_id,
        } => {
            fields.extend([
                leaf("header_size", uint(u32::from(*header_size))),
                leaf("header_version", uint(u32::from(*header_version))),
                leaf("header_canary", uint(u32::from(*canary))),
                leaf("steam_id", Scalar::UInt(*steam_id)),
                leaf("session_id", int(*session_id)),
            ]);
        }
        HeaderKind::Protobuf(proto) => {
            let optional = [
                ("steam_id", proto.steam_id.map(Scalar::UInt)),
                ("client_session_id", proto.client_session_id.map(int)),
                ("routing_app_id", proto.routing_app_id.map(uint)),
                ("target_job_name", proto.target_job_name.clone().map(Scalar::Str)),
                ("eresult", proto.eresult.map(int)),
                ("error_message", proto.error_message.clone().map(Scalar::Str)),
            ];
            for (label, value) in optional {
                if let Some(value) = value {
                    fields.push(leaf(label, value));
                }
            }
            for (number, value) in &proto.unknown {
                fields.push(leaf(&format!("unknown_{number}"), value.clone()));
            }
        }
    }
    let header_length = Scalar::UInt(header.header_byte_length as u64);
    fields.push(leaf("header_length", header_length));
    fields
}

fn marker(defect: &Defect) -> TreeNode {
    let label = match defect.kind {
        DefectKind::Truncated { .. } => "truncated",
        DefectKind::Malformed { .. } => "malformed",
        DefectKind::NestingLimit => "nesting_limit",
        DefectKind::InflateFailed { .. } => "inflate_failed",
    };
    TreeNode::leaf(NodeKind::Marker, label, Scalar::Str(defect.to_string()))
}

fn header_marker(err: &HeaderError) -> TreeNode {
    let label = match err {
        HeaderError::Truncated { .. } => "truncated",
        HeaderError::Malformed(_) => "malformed",
    };
    TreeNode::leaf(NodeKind::Marker, label, Scalar::Str(err.to_string()))
}
