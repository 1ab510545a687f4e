//! Animation baking between keyframed glTF channels and fixed-rate USF
//! splines.
//!
//! Every animation gets one global length: the largest key count of any of
//! its channels, quantized up to a multiple of 10 frames. Baked splines for
//! all animations are concatenated per node in declaration order, and the
//! actor's animation descriptors record where each one begins and ends.

use std::collections::BTreeSet;

use usfconv_math::{frame_times, quantize_length, Quat, Transform, Vec3};

use super::context::ConversionContext;
use super::ConvertResult;
use crate::gltf::{ChannelData, ChannelPath, GltfBuilder, GltfDocument, GltfResult};
use crate::usf::{AnimationDescriptor, UsfAnimation};

/// Frame rate assumed when an animation has no time span.
pub const DEFAULT_FPS: f32 = 30.0;

/// Compute every animation's baked length into `ctx.animation_lengths`.
pub fn measure_animation_lengths(
    ctx: &mut ConversionContext,
    doc: &GltfDocument,
) -> ConvertResult<()> {
    ctx.animation_lengths.clear();
    for (a, name) in doc.animation_names().into_iter().enumerate() {
        let channels = doc.animation_channels(a)?;
        let max_keys = channels.iter().map(ChannelData::key_count).max().unwrap_or(0);
        let length = quantize_length(max_keys.max(1));

        let name = if ctx.animation_lengths.contains_key(&name) {
            format!("{}_{}", name, a)
        } else {
            name
        };
        log::info!("Animation '{}': {} keys, baked length {}", name, max_keys, length);
        ctx.animation_lengths.insert(name, length);
    }
    Ok(())
}

/// Keys of one node channel sorted by time, flattened and padded with the
/// last key to `length` samples. Nodes without the channel use `rest`.
fn bake_channel(
    channels: &[ChannelData],
    node: usize,
    path: ChannelPath,
    rest: &[f32],
    length: usize,
) -> Vec<f32> {
    let width = rest.len();
    let mut keys: Vec<(f32, &[f32])> = channels
        .iter()
        .find(|c| c.node == node && c.path == path)
        .map(|c| c.times.iter().copied().zip(c.values.chunks_exact(width)).collect())
        .unwrap_or_default();
    if keys.is_empty() {
        keys.push((0.0, rest));
    }
    keys.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut samples: Vec<f32> = keys.iter().flat_map(|(_, v)| v.iter().copied()).collect();
    let last = samples[samples.len() - width..].to_vec();
    while samples.len() < length * width {
        samples.extend_from_slice(&last);
    }
    samples
}

/// Bake every animated node's channels into its `animation` payload and
/// return one descriptor per animation.
///
/// Requires [`measure_animation_lengths`] to have run on the same document.
pub fn bake_animations(
    ctx: &mut ConversionContext,
    doc: &GltfDocument,
) -> ConvertResult<Vec<AnimationDescriptor>> {
    let lengths: Vec<(String, usize)> = ctx
        .animation_lengths
        .iter()
        .map(|(name, len)| (name.clone(), *len))
        .collect();
    if lengths.is_empty() {
        return Ok(Vec::new());
    }

    let all_channels = (0..lengths.len())
        .map(|a| doc.animation_channels(a))
        .collect::<Result<Vec<_>, _>>()?;

    let mut descriptors = Vec::with_capacity(lengths.len());
    let mut begin = 0i32;
    for ((name, length), channels) in lengths.iter().zip(&all_channels) {
        let last_time = channels
            .iter()
            .filter_map(|c| c.times.iter().copied().reduce(f32::max))
            .fold(0.0f32, f32::max);
        let duration = if last_time > 0.0 {
            last_time
        } else {
            (*length as f32 - 1.0) / DEFAULT_FPS
        };
        let end = begin + *length as i32 - 1;
        descriptors.push(AnimationDescriptor {
            name: name.clone(),
            begin,
            end,
            duration,
        });
        begin = end + 1;
    }

    let animated: BTreeSet<usize> = all_channels
        .iter()
        .flat_map(|channels| channels.iter().map(|c| c.node))
        .collect();

    for &node in &animated {
        let id = ctx.by_gltf(node)?;
        let rest = doc.node_trs(node)?;
        let rest_t = rest.translation.to_array();
        let rest_r = rest.rotation.to_array();
        let rest_s = rest.scale.to_array();

        let mut anim = UsfAnimation::default();
        for ((_, length), channels) in lengths.iter().zip(&all_channels) {
            let t = bake_channel(channels, node, ChannelPath::Translation, &rest_t, *length);
            let r = bake_channel(channels, node, ChannelPath::Rotation, &rest_r, *length);
            let s = bake_channel(channels, node, ChannelPath::Scale, &rest_s, *length);
            anim.translation
                .extend(t.chunks_exact(3).map(|c| Vec3::new(c[0], c[1], c[2])));
            anim.rotation.extend(
                r.chunks_exact(4)
                    .map(|c| Quat::from_xyzw(c[0], c[1], c[2], c[3]).normalize()),
            );
            anim.scale
                .extend(s.chunks_exact(3).map(|c| Vec3::new(c[0], c[1], c[2])));
        }
        ctx.node_mut(id)?.animation = Some(anim);
    }

    log::info!(
        "Baked {} animations on {} nodes",
        descriptors.len(),
        animated.len()
    );
    Ok(descriptors)
}

/// Descriptor covering a whole spline when a scene has no actor table.
pub fn default_descriptors(frame_count: usize) -> Vec<AnimationDescriptor> {
    if frame_count == 0 {
        return Vec::new();
    }
    vec![AnimationDescriptor {
        name: "default".to_string(),
        begin: 0,
        end: frame_count as i32 - 1,
        duration: (frame_count as f32 - 1.0) / DEFAULT_FPS,
    }]
}

/// Turn one node's baked spline back into keyframe channels, one LINEAR
/// track per descriptor and path. Frames past the spline use `rest`.
pub fn unbake_animation(
    doc: &mut GltfBuilder,
    node: usize,
    anim: &UsfAnimation,
    rest: Transform,
    descriptors: &[AnimationDescriptor],
) -> GltfResult<()> {
    for d in descriptors {
        let duration = if d.duration > 0.0 {
            d.duration
        } else {
            (d.end - d.begin) as f32 / DEFAULT_FPS
        };
        let frames = frame_times(d.begin, d.end, duration);
        if frames.is_empty() {
            continue;
        }

        let mut times = Vec::with_capacity(frames.len());
        let mut translation = Vec::with_capacity(frames.len() * 3);
        let mut rotation = Vec::with_capacity(frames.len() * 4);
        let mut scale = Vec::with_capacity(frames.len() * 3);
        for (frame, time) in frames {
            let i = usize::try_from(frame).ok();
            let sample = |values: &[Vec3], fallback: Vec3| {
                i.and_then(|i| values.get(i).copied()).unwrap_or(fallback)
            };
            times.push(time);
            translation.extend(sample(&anim.translation, rest.translation).to_array());
            scale.extend(sample(&anim.scale, rest.scale).to_array());
            let r = i
                .and_then(|i| anim.rotation.get(i).copied())
                .unwrap_or(rest.rotation);
            rotation.extend(r.to_array());
        }

        doc.add_animation_channel(&d.name, node, ChannelPath::Translation, &times, &translation)?;
        doc.add_animation_channel(&d.name, node, ChannelPath::Rotation, &times, &rotation)?;
        doc.add_animation_channel(&d.name, node, ChannelPath::Scale, &times, &scale)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::NodeType;
    use usfconv_math::Mat4;

    /// Two nodes; "walk" animates both (7 and 12 keys), "idle" only `a` (3 keys).
    fn animated_document() -> (GltfDocument, usize, usize) {
        let mut doc = GltfBuilder::new("test");
        let a = doc.add_node("a", Mat4::IDENTITY, None).unwrap();
        let b = doc
            .add_node("b", Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0)), Some(a))
            .unwrap();

        let times: Vec<f32> = (0..7).map(|i| i as f32 * 0.1).collect();
        let values: Vec<f32> = (0..7).flat_map(|i| [i as f32, 0.0, 0.0]).collect();
        doc.add_animation_channel("walk", a, ChannelPath::Translation, &times, &values)
            .unwrap();

        let times: Vec<f32> = (0..12).map(|i| i as f32 * 0.1).collect();
        let values: Vec<f32> = (0..12).flat_map(|_| [0.0, 0.0, 0.0, 1.0]).collect();
        doc.add_animation_channel("walk", b, ChannelPath::Rotation, &times, &values)
            .unwrap();

        // Out of order on purpose
        doc.add_animation_channel(
            "idle",
            a,
            ChannelPath::Scale,
            &[0.5, 0.0, 0.25],
            &[3.0, 3.0, 3.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0],
        )
        .unwrap();
        (doc.finish().unwrap(), a, b)
    }

    fn context_for(doc: &GltfDocument) -> ConversionContext {
        let mut ctx = ConversionContext::new();
        for i in 0..doc.node_count() {
            let id = ctx.add_node(&doc.node_name(i), NodeType::Bone);
            ctx.bind_gltf(i, id);
        }
        ctx
    }

    #[test]
    fn test_lengths_quantized() {
        let (doc, _, _) = animated_document();
        let mut ctx = context_for(&doc);
        measure_animation_lengths(&mut ctx, &doc).unwrap();
        assert_eq!(ctx.animation_lengths["walk"], 20);
        assert_eq!(ctx.animation_lengths["idle"], 10);
        let names: Vec<&String> = ctx.animation_lengths.keys().collect();
        assert_eq!(names, ["walk", "idle"]);
    }

    #[test]
    fn test_baked_length_shared_by_all_nodes() {
        let (doc, a, b) = animated_document();
        let mut ctx = context_for(&doc);
        measure_animation_lengths(&mut ctx, &doc).unwrap();
        let descriptors = bake_animations(&mut ctx, &doc).unwrap();

        for node in [a, b] {
            let anim = ctx.nodes[node].animation.as_ref().unwrap();
            assert_eq!(anim.translation.len(), 30);
            assert_eq!(anim.rotation.len(), 30);
            assert_eq!(anim.scale.len(), 30);
        }
        for (name, length) in &ctx.animation_lengths {
            assert_eq!(length % 10, 0, "{}", name);
        }

        assert_eq!(descriptors.len(), 2);
        assert_eq!((descriptors[0].begin, descriptors[0].end), (0, 19));
        assert_eq!((descriptors[1].begin, descriptors[1].end), (20, 29));
        assert!((descriptors[0].duration - 1.1).abs() < 1e-5);
        assert!((descriptors[1].duration - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_bake_pads_and_falls_back_to_rest() {
        let (doc, a, b) = animated_document();
        let mut ctx = context_for(&doc);
        measure_animation_lengths(&mut ctx, &doc).unwrap();
        bake_animations(&mut ctx, &doc).unwrap();

        let anim_a = ctx.nodes[a].animation.as_ref().unwrap();
        // walk: 7 keys then padded with the last
        assert_eq!(anim_a.translation[6].x, 6.0);
        assert_eq!(anim_a.translation[19].x, 6.0);
        // idle has no translation channel: rest value
        assert_eq!(anim_a.translation[20], Vec3::ZERO);
        // idle scale keys sorted by time
        assert_eq!(anim_a.scale[20], Vec3::ONE);
        assert_eq!(anim_a.scale[21], Vec3::splat(2.0));
        assert_eq!(anim_a.scale[22], Vec3::splat(3.0));
        assert_eq!(anim_a.scale[29], Vec3::splat(3.0));

        let anim_b = ctx.nodes[b].animation.as_ref().unwrap();
        assert_eq!(anim_b.translation[0], Vec3::new(0.0, 5.0, 0.0));
        assert_eq!(anim_b.translation[25], Vec3::new(0.0, 5.0, 0.0));
    }

    #[test]
    fn test_unbake_thirty_frames_over_one_second() {
        let mut doc = GltfBuilder::new("test");
        let node = doc.add_node("n", Mat4::IDENTITY, None).unwrap();
        let anim = UsfAnimation {
            translation: (0..30).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect(),
            rotation: vec![Quat::IDENTITY; 30],
            scale: vec![Vec3::ONE; 30],
        };
        let descriptor = AnimationDescriptor {
            name: "run".to_string(),
            begin: 0,
            end: 29,
            duration: 1.0,
        };
        unbake_animation(&mut doc, node, &anim, Transform::default(), &[descriptor]).unwrap();

        let doc = doc.finish().unwrap();
        let channels = doc.animation_channels(0).unwrap();
        assert_eq!(channels.len(), 3);
        let translation = &channels[0];
        assert_eq!(translation.key_count(), 30);
        assert!((translation.times[29] - 1.0).abs() < 1e-6);
        // fps = 29
        assert!((translation.times[1] - 1.0 / 29.0).abs() < 1e-6);
        assert_eq!(translation.values[29 * 3], 29.0);
    }

    #[test]
    fn test_unbake_past_spline_uses_rest() {
        let mut doc = GltfBuilder::new("test");
        let node = doc.add_node("n", Mat4::IDENTITY, None).unwrap();
        let anim = UsfAnimation {
            translation: vec![Vec3::X; 5],
            rotation: vec![Quat::IDENTITY; 5],
            scale: vec![Vec3::ONE; 5],
        };
        let rest = Transform::from_translation(Vec3::new(0.0, 0.0, 9.0));
        let descriptors = [AnimationDescriptor {
            name: "long".to_string(),
            begin: 0,
            end: 9,
            duration: 0.0,
        }];
        unbake_animation(&mut doc, node, &anim, rest, &descriptors).unwrap();

        let doc = doc.finish().unwrap();
        let channels = doc.animation_channels(0).unwrap();
        let values = &channels[0].values;
        assert_eq!(values[4 * 3], 1.0);
        assert_eq!(values[9 * 3 + 2], 9.0);
        // Zero duration falls back to 30 fps
        assert!((channels[0].times[9] - 0.3).abs() < 1e-5);
    }

    #[test]
    fn test_default_descriptors() {
        assert!(default_descriptors(0).is_empty());
        let d = default_descriptors(31);
        assert_eq!((d[0].begin, d[0].end), (0, 30));
        assert!((d[0].duration - 1.0).abs() < 1e-6);
    }
}
