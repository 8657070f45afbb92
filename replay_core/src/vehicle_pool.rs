//! Positional pool of vehicle boxes.
//!
//! Slot `i` always renders the `i`-th detection of the current frame. There
//! is no identity across frames, so a box can jump between unrelated vehicles
//! when the detector reorders its output. Slots are created on first use,
//! never destroyed, and hidden when the frame has fewer detections.

use glam::Vec3;

use crate::config::ReplayConfig;
use crate::coords::WorldMapper;
use crate::record::VehicleDetection;
use crate::scene_host::{RenderableHandle, Rgb, SceneHost, Transform};

pub const VEHICLE_PALETTE: [Rgb; 6] = [
    [0.93, 0.33, 0.27],
    [0.25, 0.6, 0.95],
    [0.98, 0.74, 0.28],
    [0.2, 0.85, 0.6],
    [0.6, 0.4, 0.95],
    [0.85, 0.85, 0.88],
];

/// Palette entry for a detector class; wraps around the palette size.
pub fn palette_color(class_id: u32) -> Rgb {
    VEHICLE_PALETTE[class_id as usize % VEHICLE_PALETTE.len()]
}

#[derive(Debug, Clone)]
struct VehicleSlot {
    handle: RenderableHandle,
    visible: bool,
    transform: Transform,
}

#[derive(Debug)]
pub struct VehiclePool {
    slots: Vec<VehicleSlot>,
    mapper: WorldMapper,
    min_footprint: f32,
    vehicle_height: f32,
}

impl VehiclePool {
    pub fn new(config: &ReplayConfig) -> Self {
        Self {
            slots: Vec::new(),
            mapper: WorldMapper::from_config(config),
            min_footprint: config.min_vehicle_footprint,
            vehicle_height: config.vehicle_height,
        }
    }

    /// Bring the pool in line with one frame's detections. Returns the number
    /// of visible slots afterwards, which always equals `detections.len()`.
    pub fn reconcile<H>(&mut self, detections: &[VehicleDetection], host: &mut H) -> usize
    where
        H: SceneHost + ?Sized,
    {
        for slot in &mut self.slots {
            if slot.visible {
                host.set_visible(slot.handle, false);
                slot.visible = false;
            }
        }

        for (index, detection) in detections.iter().enumerate() {
            let color = palette_color(detection.class_id);
            let transform = self.transform_for(detection);
            let slot = self.obtain(index, color, host);
            slot.transform = transform;
            slot.visible = true;
            let handle = slot.handle;
            host.set_transform(handle, transform);
            host.set_color(handle, color);
            host.set_visible(handle, true);
        }

        detections.len()
    }

    fn obtain<H>(&mut self, index: usize, color: Rgb, host: &mut H) -> &mut VehicleSlot
    where
        H: SceneHost + ?Sized,
    {
        while self.slots.len() <= index {
            let handle = host.create_box(color);
            host.set_visible(handle, false);
            self.slots.push(VehicleSlot {
                handle,
                visible: false,
                transform: Transform::default(),
            });
        }
        &mut self.slots[index]
    }

    fn transform_for(&self, detection: &VehicleDetection) -> Transform {
        let ground = self
            .mapper
            .to_world(detection.center_x, detection.center_y);
        let footprint_x =
            ((detection.width as f32) * self.mapper.scale_x()).max(self.min_footprint);
        let footprint_z =
            ((detection.height as f32) * self.mapper.scale_z()).max(self.min_footprint);
        Transform::new(
            ground.at_elevation(self.vehicle_height / 2.0),
            Vec3::new(footprint_x, self.vehicle_height, footprint_z),
        )
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn visible_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.visible).count()
    }

    pub fn slot_handle(&self, index: usize) -> Option<RenderableHandle> {
        self.slots.get(index).map(|slot| slot.handle)
    }

    pub fn slot_transform(&self, index: usize) -> Option<Transform> {
        self.slots.get(index).map(|slot| slot.transform)
    }

    /// World position of the lowest-index visible vehicle.
    pub fn first_visible_position(&self) -> Option<Vec3> {
        self.slots
            .iter()
            .find(|slot| slot.visible)
            .map(|slot| slot.transform.translation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene_host::{RecordingSceneHost, RenderableKind};

    fn detection(class_id: u32, x: f64, y: f64) -> VehicleDetection {
        VehicleDetection::new(class_id, x, y, 0.1, 0.1)
    }

    #[test]
    fn single_detection_reuses_slot_zero() {
        let mut pool = VehiclePool::new(&ReplayConfig::default());
        let mut host = RecordingSceneHost::new();
        let frame = [detection(3, 0.5, 0.5)];

        pool.reconcile(&frame, &mut host);
        let first = pool.slot_handle(0).expect("slot 0 created");
        pool.reconcile(&frame, &mut host);

        assert_eq!(pool.slot_handle(0), Some(first));
        assert_eq!(pool.slot_count(), 1);
        assert_eq!(host.created_count(RenderableKind::Box), 1);
        assert!(host.get(first).expect("slot live").visible);
    }

    #[test]
    fn slots_grow_but_never_shrink() {
        let mut pool = VehiclePool::new(&ReplayConfig::default());
        let mut host = RecordingSceneHost::new();
        let frames: Vec<Vec<VehicleDetection>> = vec![
            vec![detection(0, 0.1, 0.9)],
            vec![
                detection(0, 0.2, 0.8),
                detection(1, 0.4, 0.6),
                detection(2, 0.6, 0.4),
            ],
            vec![],
            vec![detection(4, 0.3, 0.3), detection(5, 0.7, 0.7)],
        ];

        let mut previous_slots = 0;
        for detections in &frames {
            let visible = pool.reconcile(detections, &mut host);
            assert!(pool.slot_count() >= previous_slots);
            previous_slots = pool.slot_count();
            assert_eq!(visible, detections.len());
            assert_eq!(pool.visible_count(), detections.len());
            assert_eq!(host.visible_count(RenderableKind::Box), detections.len());
        }
        assert_eq!(pool.slot_count(), 3);
        assert_eq!(host.live_count(RenderableKind::Box), 3);
    }

    #[test]
    fn colors_wrap_around_palette() {
        for class_id in 0..20u32 {
            assert_eq!(
                palette_color(class_id),
                palette_color(class_id + VEHICLE_PALETTE.len() as u32)
            );
        }

        let mut pool = VehiclePool::new(&ReplayConfig::default());
        let mut host = RecordingSceneHost::new();
        pool.reconcile(&[detection(7, 0.5, 0.5)], &mut host);
        let handle = pool.slot_handle(0).expect("slot present");
        assert_eq!(host.get(handle).expect("live").color, palette_color(1));
    }

    #[test]
    fn reused_slot_takes_the_new_class_and_size() {
        let config = ReplayConfig::default();
        let mut pool = VehiclePool::new(&config);
        let mut host = RecordingSceneHost::new();

        pool.reconcile(&[VehicleDetection::new(0, 0.5, 0.5, 0.1, 0.1)], &mut host);
        let handle = pool.slot_handle(0).expect("slot present");
        assert_eq!(host.get(handle).expect("live").color, palette_color(0));

        pool.reconcile(&[VehicleDetection::new(2, 0.5, 0.5, 0.3, 0.2)], &mut host);
        assert_eq!(pool.slot_handle(0), Some(handle));
        assert_eq!(host.get(handle).expect("live").color, palette_color(2));
        assert_ne!(palette_color(0), palette_color(2));
        let transform = pool.slot_transform(0).expect("slot present");
        assert_eq!(transform.scale[0], 0.3 * config.world_scale_x);
        assert_eq!(transform.scale[2], 0.2 * config.world_scale_z);
        assert_eq!(host.created_count(RenderableKind::Box), 1);
    }

    #[test]
    fn degenerate_sizes_hit_the_footprint_floor() {
        let config = ReplayConfig::default();
        let mut pool = VehiclePool::new(&config);
        let mut host = RecordingSceneHost::new();
        let flat = VehicleDetection::new(0, 0.5, 0.5, 0.0, 0.0);
        pool.reconcile(&[flat], &mut host);

        let transform = pool.slot_transform(0).expect("slot present");
        assert_eq!(transform.scale[0], config.min_vehicle_footprint);
        assert_eq!(transform.scale[2], config.min_vehicle_footprint);
        assert_eq!(transform.scale[1], config.vehicle_height);
        assert_eq!(transform.translation[1], config.vehicle_height / 2.0);
    }

    #[test]
    fn placement_follows_coordinate_mapping() {
        let config = ReplayConfig::default();
        let mut pool = VehiclePool::new(&config);
        let mut host = RecordingSceneHost::new();
        pool.reconcile(&[VehicleDetection::new(0, 1.0, 1.0, 0.5, 0.5)], &mut host);

        let transform = pool.slot_transform(0).expect("slot present");
        assert_eq!(transform.translation[0], config.world_scale_x / 2.0);
        assert_eq!(transform.translation[2], -config.world_scale_z / 2.0);
        assert_eq!(transform.scale[0], 0.5 * config.world_scale_x);
        assert_eq!(
            pool.first_visible_position(),
            Some(Vec3::from_array(transform.translation))
        );
    }
}
