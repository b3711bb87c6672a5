//! Bidirectional mapping between stable lane ids and human-facing column
//! names. Rebuilt wholesale from each lane snapshot; cards referencing an
//! unknown or missing lane resolve to the default lane instead of erroring.

use std::collections::HashMap;

use crate::types::Lane;

#[derive(Debug, Clone, Default)]
pub struct LaneMapper {
    name_by_id: HashMap<String, String>,
    id_by_name: HashMap<String, String>,
    /// Lane with the lowest position, used as the fallback target.
    default_lane: Option<Lane>,
}

impl LaneMapper {
    pub fn from_lanes(lanes: &[Lane]) -> Self {
        let mut mapper = Self::default();
        for lane in lanes {
            mapper.name_by_id.insert(lane.id.clone(), lane.name.clone());
            mapper.id_by_name.insert(lane.name.clone(), lane.id.clone());
            let is_earlier = mapper
                .default_lane
                .as_ref()
                .map(|d| lane.position < d.position)
                .unwrap_or(true);
            if is_earlier {
                mapper.default_lane = Some(lane.clone());
            }
        }
        mapper
    }

    /// Column name for a lane id. Unknown or absent ids map to the
    /// default lane's name; an empty board yields an empty name.
    pub fn column_for(&self, lane_id: Option<&str>) -> String {
        lane_id
            .and_then(|id| self.name_by_id.get(id))
            .or_else(|| self.default_lane.as_ref().map(|l| &l.name))
            .cloned()
            .unwrap_or_default()
    }

    /// Lane id for a column name, if the column exists.
    pub fn lane_for(&self, column: &str) -> Option<&str> {
        self.id_by_name.get(column).map(String::as_str)
    }

    pub fn default_lane(&self) -> Option<&Lane> {
        self.default_lane.as_ref()
    }

    /// Resolve a possibly unknown lane id to a known one, falling back
    /// to the default lane.
    pub fn resolve_lane_id(&self, lane_id: Option<&str>) -> String {
        lane_id
            .filter(|id| self.name_by_id.contains_key(*id))
            .map(str::to_string)
            .or_else(|| self.default_lane.as_ref().map(|l| l.id.clone()))
            .unwrap_or_default()
    }

    pub fn contains(&self, lane_id: &str) -> bool {
        self.name_by_id.contains_key(lane_id)
    }
}
